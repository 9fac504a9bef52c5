//! Stateless text-cleanup utilities applied to complete LLM responses before
//! or after sentence splitting (spec.md §4.2).
//!
//! All patterns are compiled once into process-wide statics; every public
//! function is a pure `&str -> String` transform, so the module needs no
//! synchronization beyond `OnceLock`'s own.

use regex::Regex;
use std::sync::OnceLock;

fn markdown_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"(?s)```[^\n]*\n.*?```").unwrap(), "[code block]"),
            (Regex::new(r"~~([^~]+)~~").unwrap(), "$1"),
            (Regex::new(r"`([^`]+)`").unwrap(), "$1"),
            (Regex::new(r"\*\*\*([^*]+)\*\*\*").unwrap(), "$1"),
            (Regex::new(r"\*\*([^*]+)\*\*").unwrap(), "$1"),
            (Regex::new(r"\*([^*]+)\*").unwrap(), "$1"),
            (Regex::new(r"__([^_]+)__").unwrap(), "$1"),
            (Regex::new(r"_([^_]+)_").unwrap(), "$1"),
            (Regex::new(r"(?m)^#{1,6}\s+").unwrap(), ""),
            (Regex::new(r"(?m)^\s*[-*+]\s+").unwrap(), ""),
            (Regex::new(r"(?m)^\s*\d+\.\s+").unwrap(), ""),
            (Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap(), "$1"),
            (Regex::new(r"(?m)^>\s?").unwrap(), ""),
            (Regex::new(r"(?m)^\s*(?:-{3,}|\*{3,}|_{3,})\s*$").unwrap(), ""),
            (Regex::new(r"(?m)^\s*\|[-:| ]+\|\s*$").unwrap(), ""),
            (Regex::new(r"\|").unwrap(), " "),
        ]
    })
}

fn symbol_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"\$(\d[\d,]*(?:\.\d+)?)").unwrap(), "$1 dollars"),
            (Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap(), "$1 percent"),
            (Regex::new(r"(-?\d+(?:\.\d+)?)\s*°\s*[Ff]").unwrap(), "$1 degrees Fahrenheit"),
            (Regex::new(r"(-?\d+(?:\.\d+)?)\s*°\s*[Cc]").unwrap(), "$1 degrees Celsius"),
            (Regex::new(r"(-?\d+(?:\.\d+)?)\s*°").unwrap(), "$1 degrees"),
            (Regex::new(r"=>").unwrap(), "becomes"),
            (Regex::new(r"->|→").unwrap(), "to"),
            (Regex::new(r"<-|←").unwrap(), "from"),
            (Regex::new(r"\.\.\.|…").unwrap(), "."),
            (Regex::new(r"&").unwrap(), "and"),
            (Regex::new(r">=|≥").unwrap(), "greater than or equal to"),
            (Regex::new(r"<=|≤").unwrap(), "less than or equal to"),
            (Regex::new(r"!=|≠").unwrap(), "not equal to"),
            (Regex::new(r"\bnull\b").unwrap(), "null value"),
            (Regex::new(r"\bnil\b").unwrap(), "nil value"),
        ]
    })
}

fn equals_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Runs after the >=/<=/!= patterns above have already consumed those
    // multi-char operators, so a bare "=" or "==" left at this point is a
    // plain equality.
    PATTERN.get_or_init(|| Regex::new(r"==|=").unwrap())
}

fn multiply_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d)\s*\*\s*(\d)").unwrap())
}

fn emoji_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            "[",
            "\u{1F300}-\u{1FAFF}",
            "\u{2600}-\u{27BF}",
            "\u{1F1E6}-\u{1F1FF}",
            "\u{2190}-\u{21FF}",
            "]",
        ))
        .unwrap()
    })
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

fn blank_lines_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn code_fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```([^\n]*)\n(.*?)```").unwrap())
}

/// Strip markdown formatting markers, leaving the underlying text content.
#[must_use]
pub fn remove_markdown(input: &str) -> String {
    let mut text = input.to_owned();
    for (pattern, replacement) in markdown_patterns() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text
}

/// Replace symbols that read poorly aloud (currency, percent, temperature,
/// arrows, comparison operators, null/nil) with their spoken equivalents.
#[must_use]
pub fn convert_symbols(input: &str) -> String {
    let mut text = input.to_owned();
    for (pattern, replacement) in symbol_patterns() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text = multiply_pattern().replace_all(&text, "$1 times $2").into_owned();
    text = equals_pattern().replace_all(&text, "equals").into_owned();
    text
}

/// Strip emoji and pictograph characters.
#[must_use]
pub fn remove_emoji(input: &str) -> String {
    emoji_pattern().replace_all(input, "").into_owned()
}

/// Collapse runs of horizontal whitespace and excess blank lines, and trim
/// the result.
#[must_use]
pub fn normalize_whitespace(input: &str) -> String {
    let collapsed = whitespace_pattern().replace_all(input, " ");
    let collapsed = blank_lines_pattern().replace_all(&collapsed, "\n\n");
    collapsed.trim().to_owned()
}

/// Remove fenced code blocks, replacing each with the literal
/// `"[code block]"` placeholder, and report how many blocks were removed.
#[must_use]
pub fn remove_code_blocks(input: &str) -> (String, usize) {
    let count = code_fence_pattern().find_iter(input).count();
    let cleaned = code_fence_pattern().replace_all(input, "[code block]").into_owned();
    (cleaned, count)
}

/// Extract the body of each fenced code block, paired with its language hint
/// (empty string if none was given).
#[must_use]
pub fn extract_code_blocks(input: &str) -> Vec<(String, String)> {
    code_fence_pattern()
        .captures_iter(input)
        .map(|caps| {
            let lang = caps.get(1).map_or("", |m| m.as_str()).trim().to_owned();
            let body = caps.get(2).map_or("", |m| m.as_str()).to_owned();
            (lang, body)
        })
        .collect()
}

/// Heuristic: true when code blocks make up a large share of the response,
/// signaling that voice delivery would be mostly placeholder text. Matches
/// on either two or more fenced blocks, or more than half the characters
/// sitting inside fences.
#[must_use]
pub fn is_code_heavy(input: &str) -> bool {
    let total = input.len();
    if total == 0 {
        return false;
    }
    let mut block_count = 0usize;
    let code_len: usize = code_fence_pattern()
        .find_iter(input)
        .map(|m| {
            block_count += 1;
            m.as_str().len()
        })
        .sum();
    block_count >= 2 || code_len * 2 > total
}

/// Hot-path sanitization applied per streaming sentence: symbol conversion,
/// emoji removal, then whitespace normalization. Markdown stripping is
/// deliberately excluded here; it's a whole-response concern, not a
/// per-sentence one.
#[must_use]
pub fn sanitize_for_sentence(input: &str) -> String {
    let text = convert_symbols(input);
    let text = remove_emoji(&text);
    normalize_whitespace(&text)
}
