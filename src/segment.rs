//! Debounced buffering and chunk extraction.
//!
//! Raw text accumulates in a [`PendingBuffer`] until output goes quiet for
//! the debounce window, then gets split into bounded speakable chunks at
//! paragraph and sentence boundaries.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// A paragraph at most this long is spoken as a single chunk.
pub const PARAGRAPH_LIMIT: usize = 500;

/// Longer paragraphs are re-packed into sentence chunks below this bound.
pub const CHUNK_LIMIT: usize = 400;

static RE_PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Text accumulated since the last flush, stamped with its latest append.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    text: String,
    last_append: Option<Instant>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn append(&mut self, text: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
        self.last_append = Some(Instant::now());
    }

    /// True once the buffer holds text and the debounce window has elapsed
    /// since the most recent append.
    pub fn is_ripe(&self, debounce: Duration) -> bool {
        match self.last_append {
            Some(at) if !self.is_empty() => at.elapsed() > debounce,
            _ => false,
        }
    }

    /// Drain the buffer. The buffer is emptied atomically; callers hold the
    /// surrounding lock for the whole append/check/take sequence.
    pub fn take(&mut self) -> String {
        self.last_append = None;
        std::mem::take(&mut self.text)
    }
}

/// Split text into speakable chunks at paragraph, then sentence, boundaries.
///
/// A sentence longer than [`CHUNK_LIMIT`] on its own is never split; it is
/// emitted whole.
pub fn extract_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();

    for paragraph in RE_PARAGRAPH_BREAK.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() < PARAGRAPH_LIMIT {
            chunks.push(paragraph.to_string());
            continue;
        }

        pack_sentences(paragraph, CHUNK_LIMIT, &mut chunks);
    }

    chunks
}

/// Greedily pack sentences into chunks no longer than `limit`.
pub fn pack_sentences(text: &str, limit: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if current.len() + sentence.len() < limit {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = sentence.to_string();
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
}

/// Split text into sentences at `.!?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let end = i + 1;
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}
