//! Claude Code JSONL transcript parsing.
//!
//! Each line of a session transcript is one JSON record. Only records with
//! `type == "assistant"` carry speakable text; their `message.content` blocks
//! of `type == "text"` are joined with single spaces.

use serde::Deserialize;

#[derive(Deserialize)]
struct TranscriptEntry {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    uuid: Option<String>,
    message: Option<TranscriptMessage>,
}

#[derive(Deserialize)]
struct TranscriptMessage {
    id: Option<String>,
    content: Option<Vec<ContentBlock>>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

/// Speakable payload extracted from one transcript record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantText {
    pub text: String,
    /// `message.id` when present, else the record's `uuid`. A single API
    /// response can be split across several records with distinct uuids but
    /// the same `message.id`, so the message id is the dedup key. Records
    /// carrying neither stay unique forever.
    pub identity: Option<String>,
}

/// Parse one JSONL line. Returns `None` for malformed lines, non-assistant
/// records, and records without text content.
pub fn parse_line(line: &str) -> Option<AssistantText> {
    let entry: TranscriptEntry = serde_json::from_str(line).ok()?;

    if entry.entry_type.as_deref() != Some("assistant") {
        return None;
    }

    let message = entry.message?;
    let identity = message.id.or(entry.uuid);

    let mut texts: Vec<&str> = Vec::new();
    for block in message.content.as_deref().unwrap_or_default() {
        if block.block_type.as_deref() != Some("text") {
            continue;
        }
        if let Some(text) = block.text.as_deref() {
            if !text.trim().is_empty() {
                texts.push(text);
            }
        }
    }

    if texts.is_empty() {
        return None;
    }

    Some(AssistantText {
        text: texts.join(" "),
        identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_assistant_text_and_id() {
        let line = r#"{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"Hello there"}]}}"#;
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.text, "Hello there");
        assert_eq!(parsed.identity.as_deref(), Some("m1"));
    }

    #[test]
    fn joins_multiple_text_blocks() {
        let line = r#"{"type":"assistant","message":{"id":"m2","content":[
            {"type":"text","text":"First."},
            {"type":"tool_use","name":"Bash"},
            {"type":"text","text":"Second."}
        ]}}"#;
        assert_eq!(parse_line(line).unwrap().text, "First. Second.");
    }

    #[test]
    fn falls_back_to_uuid() {
        let line = r#"{"type":"assistant","uuid":"u-77","message":{"content":[{"type":"text","text":"hi there folks"}]}}"#;
        assert_eq!(parse_line(line).unwrap().identity.as_deref(), Some("u-77"));
    }

    #[test]
    fn ignores_user_records() {
        let line = r#"{"type":"user","message":{"content":[{"type":"text","text":"prompt"}]}}"#;
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn malformed_line_is_skipped() {
        assert!(parse_line("{not json").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn blank_text_blocks_do_not_count() {
        let line = r#"{"type":"assistant","message":{"id":"m3","content":[{"type":"text","text":"   "}]}}"#;
        assert!(parse_line(line).is_none());
    }
}
