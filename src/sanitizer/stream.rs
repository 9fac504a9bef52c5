//! Incremental tokenized output processor that emits TTS-ready sentences
//! (spec.md §4.1).
//!
//! One instance is created per active LLM turn; it is not shared across
//! turns. A single mutex serializes all operations (including the
//! observability accessors, which return copies) so a single token producer
//! can drive it safely even if an accessor is called concurrently from a
//! UI thread.

use std::sync::Mutex;

/// Curated file-extension tokens that must never be treated as sentence
/// terminators even when followed by whitespace.
const FILE_EXTENSIONS: &[&str] = &[
    ".go", ".rs", ".py", ".js", ".jsx", ".ts", ".tsx", ".json", ".md", ".txt", ".yaml", ".yml",
    ".toml", ".html", ".htm", ".css", ".scss", ".sh", ".bash", ".rb", ".c", ".h", ".cpp", ".hpp",
    ".java", ".kt", ".swift", ".xml", ".csv", ".pdf", ".png", ".jpg", ".jpeg", ".gif", ".svg",
    ".zip", ".tar", ".gz", ".log", ".ini", ".cfg", ".env", ".sql", ".php", ".lock",
];

/// Curated abbreviations (with their trailing period) that must not be
/// treated as sentence terminators.
const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "mr.", "mrs.", "ms.", "dr.", "jr.", "sr.",
];

/// Human-readable code-fence language labels used in flush placeholders.
fn language_label(hint: &str) -> Option<&'static str> {
    match hint.trim().to_lowercase().as_str() {
        "go" | "golang" => Some("Go"),
        "py" | "python" => Some("Python"),
        "js" | "javascript" => Some("JavaScript"),
        "ts" | "typescript" => Some("TypeScript"),
        "rs" | "rust" => Some("Rust"),
        "java" => Some("Java"),
        "c" => Some("C"),
        "cpp" | "c++" => Some("C++"),
        "rb" | "ruby" => Some("Ruby"),
        "sh" | "bash" | "shell" => Some("shell"),
        "sql" => Some("SQL"),
        "html" => Some("HTML"),
        "css" => Some("CSS"),
        _ => None,
    }
}

fn code_block_placeholder(lang_hint: &Option<String>) -> String {
    match lang_hint.as_deref().and_then(language_label) {
        Some(label) => format!("Here's some {label} code."),
        None => "Here's a code block.".to_owned(),
    }
}

struct Inner {
    buffer: String,
    in_code_block: bool,
    code_lang: Option<String>,
    /// Set when we've entered a code block but the fence marker's own token
    /// didn't yet carry the rest of its line, so the language hint (if any)
    /// is still waiting in a future token.
    hint_pending: bool,
    code_block_count: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            in_code_block: false,
            code_lang: None,
            hint_pending: false,
            code_block_count: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed one token, returning a ready sentence if the buffer now ends on
    /// a sentence boundary, or toggling code-block state on a fence marker.
    fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);

        if self.in_code_block && self.hint_pending {
            match self.buffer.find('\n') {
                Some(nl) => {
                    let hint = self.buffer[..nl].trim().to_owned();
                    self.code_lang = if hint.is_empty() { None } else { Some(hint) };
                    self.buffer = self.buffer[nl + 1..].to_owned();
                    self.hint_pending = false;
                }
                None => return None,
            }
        }

        if let Some(fence_idx) = find_fence(&self.buffer) {
            return self.handle_fence(fence_idx);
        }

        if self.in_code_block {
            return None;
        }

        self.take_ready_sentence()
    }

    /// Split off the earliest valid sentence boundary, if any.
    fn take_ready_sentence(&mut self) -> Option<String> {
        let boundary = find_boundary(&self.buffer)?;
        let sentence = self.buffer[..boundary].trim().to_owned();
        self.buffer = self.buffer[boundary..].trim_start().to_owned();
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }

    /// Handle a just-appended ` ``` ` fence: either enter code-block mode
    /// (emitting any complete buffered prose first) or leave it (emitting a
    /// placeholder).
    fn handle_fence(&mut self, fence_idx: usize) -> Option<String> {
        let before = self.buffer[..fence_idx].to_owned();
        let after_fence_start = fence_idx + 3;

        if !self.in_code_block {
            // Entering a code block: the fence may carry a language hint on
            // the same line (e.g. "```go\n"), but a real token stream can
            // just as easily split the fence marker from its language line
            // across two separate tokens. If no newline has arrived yet,
            // defer the hint to the next push() call(s).
            let rest = &self.buffer[after_fence_start..];
            let leftover_before = before.trim().to_owned();
            self.in_code_block = true;
            match rest.find('\n') {
                Some(nl) => {
                    let hint = rest[..nl].trim().to_owned();
                    self.code_lang = if hint.is_empty() { None } else { Some(hint) };
                    self.buffer = rest[nl + 1..].to_owned();
                    self.hint_pending = false;
                }
                None => {
                    self.buffer = rest.to_owned();
                    self.hint_pending = true;
                }
            }

            if leftover_before.is_empty() {
                None
            } else {
                Some(leftover_before)
            }
        } else {
            // Leaving a code block: emit a deterministic placeholder and
            // discard the raw code body (the `before` text).
            self.code_block_count += 1;
            let placeholder = code_block_placeholder(&self.code_lang);
            self.in_code_block = false;
            self.code_lang = None;
            self.hint_pending = false;
            self.buffer = self.buffer[after_fence_start..].trim_start().to_owned();
            Some(placeholder)
        }
    }

    fn flush(&mut self) -> Option<String> {
        if self.in_code_block {
            self.code_block_count += 1;
            let placeholder = code_block_placeholder(&self.code_lang);
            self.reset();
            return Some(placeholder);
        }
        let remaining = self.buffer.trim().to_owned();
        self.buffer.clear();
        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }
}

/// Locate the byte index of the next unconsumed ` ``` ` marker, if any.
fn find_fence(buf: &str) -> Option<usize> {
    buf.find("```")
}

/// Locate the end (exclusive) of the earliest valid sentence in `buf`, or
/// `None` if no terminator qualifies yet.
fn find_boundary(buf: &str) -> Option<usize> {
    let bytes_len = buf.len();
    for (idx, ch) in buf.char_indices() {
        match ch {
            '!' | '?' => {
                let next = buf[idx + 1..].chars().next();
                if next.is_none() || next.is_some_and(char::is_whitespace) {
                    return Some(idx + 1);
                }
            }
            '.' => {
                if let Some(end) = evaluate_period(buf, idx, bytes_len) {
                    return Some(end);
                }
            }
            _ => {}
        }
    }
    None
}

fn evaluate_period(buf: &str, idx: usize, bytes_len: usize) -> Option<usize> {
    let next = buf[idx + 1..].chars().next();
    let prev = buf[..idx].chars().last();

    let followed_by_boundary = next.is_none() || next.is_some_and(char::is_whitespace);
    if !followed_by_boundary {
        return None;
    }

    let decimal_or_ip_guard =
        prev.is_some_and(|c| c.is_ascii_digit()) && next.is_some_and(|c| c.is_ascii_digit() || c.is_ascii_alphabetic());
    if decimal_or_ip_guard {
        return None;
    }

    if next.is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }

    let start = token_start(buf, idx);
    let token = &buf[start..idx + 1];
    let lower_token = token.to_lowercase();

    if ABBREVIATIONS.contains(&lower_token.as_str()) {
        return None;
    }

    let without_dot = &token[..token.len() - 1];
    let lower_without_dot = without_dot.to_lowercase();
    if FILE_EXTENSIONS.iter().any(|ext| lower_without_dot.ends_with(ext)) {
        return None;
    }

    if is_version_token(without_dot) {
        return None;
    }

    if token.contains('/') || token.contains('\\') {
        return None;
    }

    let _ = bytes_len;
    Some(idx + 1)
}

fn token_start(buf: &str, period_idx: usize) -> usize {
    buf[..period_idx]
        .rfind(char::is_whitespace)
        .map_or(0, |i| i + 1)
}

fn is_version_token(token: &str) -> bool {
    let body = token.strip_prefix(['v', 'V']).unwrap_or(token);
    if body.is_empty() {
        return false;
    }
    let mut digit_count = 0usize;
    let mut period_count = 0usize;
    for c in body.chars() {
        if c.is_ascii_digit() {
            digit_count += 1;
        } else if c == '.' {
            period_count += 1;
        } else {
            return false;
        }
    }
    period_count >= 1 && digit_count >= 2
}

/// Incremental sentence-boundary sanitizer for one LLM turn's token stream.
pub struct StreamSanitizer {
    inner: Mutex<Inner>,
}

impl StreamSanitizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Feed the next token. Returns `Some(sentence)` when a complete
    /// utterance is ready; callers must loop on a single token in case it
    /// completes more than one boundary (at most one sentence is returned
    /// per call).
    pub fn push_token(&self, token: &str) -> Option<String> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).push(token)
    }

    /// Flush and clear all buffered state, returning the remainder (or a
    /// code-block placeholder if a fence was left open).
    pub fn flush(&self) -> Option<String> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }

    /// Zero all state back to a freshly constructed sanitizer.
    pub fn reset(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).buffer.len()
    }

    #[must_use]
    pub fn in_code_block(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_code_block
    }

    #[must_use]
    pub fn code_block_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .code_block_count
    }

    #[must_use]
    pub fn peek_buffer(&self) -> String {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).buffer.clone()
    }
}

impl Default for StreamSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
