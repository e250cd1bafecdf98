//! Bracket-depth scanner for JSON objects embedded in free text
//!
//! The scanner only finds candidate substrings; decoding them is left to
//! the caller. Candidates are top-level `{...}` spans, in the order they
//! appear.

/// Top-level balanced `{...}` spans, string-aware
///
/// Braces inside JSON string literals do not count. Quotes outside any
/// object are prose and are ignored. An object still open at the end of
/// the text is dropped.
pub fn object_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    candidates.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    candidates
}

/// Top-level balanced `{...}` spans counting every brace
///
/// Used on malformed output where unescaped quotes make string tracking
/// unreliable.
pub fn loose_object_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    candidates.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    candidates
}

/// Balanced object starting at the first `{` of `text`, if it closes
pub fn leading_object(text: &str) -> Option<&str> {
    let open = text.find('{')?;
    loose_object_candidates(&text[open..]).into_iter().next()
}
