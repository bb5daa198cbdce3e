//! Text cleaning for natural speech.
//!
//! Strips terminal formatting and markup noise from Claude Code output so the
//! synthesis backend receives plain prose. The rules run in a fixed order:
//! structural stripping first (ANSI, code blocks, tool tags), then symbol to
//! word substitution, then whitespace collapsing. The whole pipeline is
//! idempotent: cleaning already-clean text is a no-op, which lets the
//! segmenter re-present partially cleaned text safely.

use std::sync::LazyLock;

use regex::Regex;

/// Which optional cleaning passes to apply.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Collapse fenced/indented code blocks to a placeholder and unwrap
    /// inline code spans.
    pub strip_code: bool,
    /// Remove absolute filesystem paths (they sound awful read aloud).
    pub strip_paths: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            strip_code: true,
            strip_paths: true,
        }
    }
}

macro_rules! regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).expect("valid regex"))
    };
}

// ANSI escape sequences (colors, cursor moves, OSC titles)
static RE_ANSI: LazyLock<Regex> =
    regex!(r"\x1b\[[0-9;]*[A-Za-z]|\x1b\].*?\x07|\x1b[()][AB012]");

// Spinner and progress characters
static RE_SPINNER: LazyLock<Regex> = regex!(r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏⣷⣯⣟⡿⢿⣻⣽⣾✻◐◑◒◓⏳⌛🔄]");

// Box-drawing and decorative Unicode chars
static RE_BOX: LazyLock<Regex> = regex!(
    r"[─━│┃┌┐└┘├┤┬┴┼╭╮╰╯╔╗╚╝╠╣╦╩╬═║▀▄█▌▐░▒▓●○◆◇■□▪▫★☆✓✗✔✘⎿⎡⎣⎤⎦►▶◀◁▷▸▹◂◃]"
);

// Tool use / XML-like tags echoed into the terminal
static RE_TOOL_TAGS: LazyLock<Regex> =
    regex!(r"</?(?:tool|artifact|function|parameter|result|content|antml)[^>]*>");

// Progress-bar fragments like `42% |████▏  `
static RE_PROGRESS: LazyLock<Regex> = regex!(r"\d+%\s*[|█▓▒░=>#\[\]-]+");

// Token-count, timing and cost summary lines
static RE_TOKENS: LazyLock<Regex> = regex!(r"(?mi)^\s*[\d,.]+\s*(?:tokens?|tok)\b.*$");
static RE_TIMING: LazyLock<Regex> =
    regex!(r"(?mi)^\s*(?:✻\s*)?(?:Worked|Completed|Duration|Elapsed)\s+(?:for\s+)?\d+.*$");
static RE_COST: LazyLock<Regex> = regex!(r"(?mi)^\s*(?:Cost|Tokens?|Input|Output|Cache)[\s:]+[\d$.,]+.*$");

// Tool invocation echo lines (Read, Write, Bash, ...)
static RE_TOOL_INVOKE: LazyLock<Regex> =
    regex!(r"(?m)^\s*(?:Read|Write|Edit|Bash|Glob|Grep|Task|TodoWrite)\s*\(.*\)\s*$");

// Diff markers at line start (the captured whitespace is kept)
static RE_DIFF: LazyLock<Regex> = regex!(r"(?m)^[+-]{1,3}(\s)");

// Lines that are purely decorative
static RE_DECORATIVE_LINE: LazyLock<Regex> = regex!(r"(?m)^[\s─━═╌╍┈┉•·…\-_~*#=+|<>/\\]+$");

// Absolute paths (Unix and Windows)
static RE_WIN_PATH: LazyLock<Regex> = regex!(r"(?m)(?:^|\s)[A-Za-z]:\\(?:[\w.-]+\\?)+");
static RE_FILE_PATH: LazyLock<Regex> =
    regex!(r"(?m)(?:^|\s)(?:[A-Za-z]:)?(?:[/\\][\w.-]+){2,}(?::\d+)?");

// Fenced code spans, with or without a language line
static RE_FENCED: LazyLock<Regex> = regex!(r"(?s)```.*?```");

// Indented code blocks (4+ spaces, 3+ consecutive lines)
static RE_INDENTED: LazyLock<Regex> = regex!(r"(?m)(?:^[ \t]{4,}\S.*\n){3,}");

// Inline backtick code span
static RE_INLINE_CODE: LazyLock<Regex> = regex!(r"`([^`]+)`");

// Markdown structure
static RE_MD_LINK: LazyLock<Regex> = regex!(r"\[([^\]]+)\]\([^)]+\)");
static RE_MD_IMAGE: LazyLock<Regex> = regex!(r"!\[[^\]]*\]\([^)]+\)");
static RE_MD_BOLD: LazyLock<Regex> = regex!(r"\*{1,3}([^*]+)\*{1,3}");
static RE_MD_ITALIC: LazyLock<Regex> = regex!(r"_{1,3}(\S[^_]*\S)_{1,3}");
static RE_MD_HEADER: LazyLock<Regex> = regex!(r"(?m)^#{1,6}\s+");
static RE_MD_RULE: LazyLock<Regex> = regex!(r"(?m)^[-*_]{3,}\s*$");
static RE_MD_BULLET: LazyLock<Regex> = regex!(r"(?m)^\s*[-*+]\s+");
static RE_MD_NUMBERED: LazyLock<Regex> = regex!(r"(?m)^\s*\d+[.)]\s+");

static RE_HTML_TAG: LazyLock<Regex> = regex!(r"<[^>]+>");
static RE_URL: LazyLock<Regex> = regex!(r"https?://\S+");

// Identifier-style underscores (snake_case). Leading-double-underscore
// tokens are kept verbatim by the replacement closure.
static RE_IDENTIFIER: LazyLock<Regex> = regex!(r"\b\w+_\w+\b");

// Parenthetical file references like (file.php:123)
static RE_PAREN_FILE_REF: LazyLock<Regex> = regex!(r"\([^)]*\.\w+:\d+\)");

// Curly braces and square brackets
static RE_BRACKETS: LazyLock<Regex> = regex!(r"[{}\[\]]");

// Runs of repeated punctuation (----, ====, __)
static RE_PUNCT_RUN: LazyLock<Regex> = regex!(r"[=_-]{2,}");

// Runs of spaces/tabs
static RE_SPACE_RUN: LazyLock<Regex> = regex!(r"[ \t]{2,}");

// Multiple consecutive newlines (applied after per-line trimming)
static RE_BLANK_RUN: LazyLock<Regex> = regex!(r"\n{2,}");

/// Clean raw assistant output into speakable prose.
pub fn normalize(raw: &str, options: NormalizeOptions) -> String {
    let mut text = strip_terminal_noise(raw);

    if options.strip_paths {
        text = strip_paths(&text);
    }
    if options.strip_code {
        text = collapse_code(&text);
    }

    text = collapse_markdown(&text);
    text = convert_symbols(&text);
    text = split_identifiers(&text);
    text = split_qualified_dots(&text);
    text = strip_leftover_punctuation(&text);
    collapse_whitespace(&text)
}

/// Remove terminal control sequences, decorations, and status lines.
fn strip_terminal_noise(text: &str) -> String {
    let text = RE_ANSI.replace_all(text, "");
    let text = RE_SPINNER.replace_all(&text, "");
    let text = RE_BOX.replace_all(&text, " ");
    let text = RE_TOOL_TAGS.replace_all(&text, "");
    let text = RE_PROGRESS.replace_all(&text, "");
    let text = RE_TOKENS.replace_all(&text, "");
    let text = RE_TIMING.replace_all(&text, "");
    let text = RE_COST.replace_all(&text, "");
    let text = RE_TOOL_INVOKE.replace_all(&text, "");
    let text = RE_DIFF.replace_all(&text, "$1");
    RE_DECORATIVE_LINE.replace_all(&text, "").into_owned()
}

/// Remove absolute filesystem path tokens.
fn strip_paths(text: &str) -> String {
    let text = RE_WIN_PATH.replace_all(text, " ");
    RE_FILE_PATH.replace_all(&text, " ").into_owned()
}

/// Collapse code blocks to a placeholder; unwrap inline code spans.
fn collapse_code(text: &str) -> String {
    let text = RE_FENCED.replace_all(text, " [code block] ");
    let text = RE_INDENTED.replace_all(&text, "[code block]\n");
    RE_INLINE_CODE.replace_all(&text, "$1").into_owned()
}

/// Reduce markdown syntax to its readable text.
fn collapse_markdown(text: &str) -> String {
    let text = RE_MD_LINK.replace_all(text, "$1");
    let text = RE_MD_IMAGE.replace_all(&text, "");
    let text = RE_MD_BOLD.replace_all(&text, "$1");
    let text = RE_MD_ITALIC.replace_all(&text, "$1");
    let text = RE_MD_HEADER.replace_all(&text, "");
    let text = RE_MD_RULE.replace_all(&text, "");
    let text = RE_MD_BULLET.replace_all(&text, "");
    let text = RE_MD_NUMBERED.replace_all(&text, "");
    let text = RE_HTML_TAG.replace_all(&text, "");
    RE_URL.replace_all(&text, "").into_owned()
}

/// Turn arrows and common symbols into spoken words or spaces.
fn convert_symbols(text: &str) -> String {
    text.replace('→', " to ")
        .replace('←', " from ")
        .replace("=>", " to ")
        .replace("->", " to ")
        .replace(">>", " ")
        .replace("<<", " ")
        .replace("&amp;", " and ")
        .replace('&', " and ")
        .replace('|', " or ")
        .replace('@', " at ")
        .replace('~', " ")
}

/// Split snake_case identifiers into words. `__dunder`-style tokens with a
/// leading double underscore are kept verbatim.
fn split_identifiers(text: &str) -> String {
    RE_IDENTIFIER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            if token.starts_with("__") {
                token.to_string()
            } else {
                token.replace('_', " ")
            }
        })
        .into_owned()
}

/// Turn qualified-name dots into spaces (`item.image` -> `item image`),
/// preserving decimal numbers and ellipses.
fn split_qualified_dots(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '.' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_alpha = chars.get(i + 1).is_some_and(|n| n.is_alphabetic());
            if !prev_digit && next_alpha {
                out.push(' ');
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Remove leftover punctuation that would be read literally.
fn strip_leftover_punctuation(text: &str) -> String {
    let text = RE_PAREN_FILE_REF.replace_all(text, "");
    let text = strip_standalone_specials(&text);
    let text = RE_BRACKETS.replace_all(&text, " ");
    RE_PUNCT_RUN.replace_all(&text, " ").into_owned()
}

/// Replace `\ $ ^ \` ~` with a space when not attached to a word on either
/// side.
fn strip_standalone_specials(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '\\' | '$' | '^' | '`' | '~') {
            let prev_word = i > 0 && is_word_char(chars[i - 1]);
            let next_word = chars.get(i + 1).is_some_and(|&n| is_word_char(n));
            if !prev_word && !next_word {
                out.push(' ');
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Collapse space runs, trim every line, and squeeze blank lines.
fn collapse_whitespace(text: &str) -> String {
    let text = RE_SPACE_RUN.replace_all(text, " ");
    let trimmed: String = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    RE_BLANK_RUN.replace_all(&trimmed, "\n").trim().to_string()
}
