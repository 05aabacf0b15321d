//! Prompt sanitizer applied to user text before it reaches a model prompt.
//!
//! Strictly subtractive: it strips control characters, collapses whitespace
//! runs, removes known prompt-injection markers, and caps length. It never
//! inserts text and never fails.

/// Phrases that attempt to re-role the model or leak the system prompt.
/// Shared with the response validator, which rejects output containing
/// them.
pub const INJECTION_MARKERS: [&str; 8] = [
    "ignore previous instructions",
    "ignore all previous instructions",
    "disregard previous instructions",
    "you are now the system",
    "system prompt:",
    "<|im_start|>",
    "<|im_end|>",
    "[system]",
];

/// Conservative text scrubber. One instance per processor; `clean` is
/// CPU-bound and O(n) in the text length.
#[derive(Debug, Clone)]
pub struct PromptSanitizer {
    max_text_length: usize,
}

impl PromptSanitizer {
    pub fn new(max_text_length: usize) -> Self {
        Self { max_text_length }
    }

    /// Scrub `text` for embedding into a prompt.
    pub fn clean(&self, text: &str) -> String {
        let mut cleaned = strip_control_chars(text);
        for marker in INJECTION_MARKERS {
            cleaned = remove_marker(&cleaned, marker);
        }
        let collapsed = collapse_whitespace(&cleaned);
        cap_chars(&collapsed, self.max_text_length)
    }
}

/// Drop control characters, keeping ordinary whitespace.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Remove every case-insensitive occurrence of an ASCII marker phrase.
fn remove_marker(text: &str, marker: &str) -> String {
    let haystack = text.as_bytes();
    let needle = marker.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return text.to_string();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        let end = i + needle.len();
        let matches = end <= haystack.len()
            && haystack[i..end]
                .iter()
                .zip(needle)
                .all(|(a, b)| a.eq_ignore_ascii_case(b));
        if matches {
            i = end;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    // Only ASCII ranges were removed, so the result is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

/// Collapse each whitespace run to a single character: a newline when the
/// run contained one, a space otherwise. Leading and trailing runs are
/// dropped.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run_has_newline = false;
    let mut in_run = false;

    for c in text.chars() {
        if c.is_whitespace() {
            in_run = true;
            run_has_newline |= c == '\n';
        } else {
            if in_run && !out.is_empty() {
                out.push(if run_has_newline { '\n' } else { ' ' });
            }
            in_run = false;
            run_has_newline = false;
            out.push(c);
        }
    }
    out
}

fn cap_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
