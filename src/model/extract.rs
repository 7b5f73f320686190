//! Best-effort extraction of JSON spans from free-form model output.
//!
//! Models wrap JSON in prose or code fences. These helpers locate the first
//! balanced `{...}` or `[...]` span, respecting string literals, and leave the
//! decision of what to do with malformed output to the caller.

use serde_json::Value;

/// First balanced span opened by `open` and closed by `close`.
fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced `{...}` span.
pub fn extract_json_object(text: &str) -> Option<&str> {
    balanced_span(text, '{', '}')
}

/// First balanced `[...]` span.
pub fn extract_json_array(text: &str) -> Option<&str> {
    balanced_span(text, '[', ']')
}

/// Parse the first JSON object in `text`, if any.
pub fn parse_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let span = extract_json_object(text)?;
    match serde_json::from_str(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parse the first JSON array in `text`, if any.
pub fn parse_json_array(text: &str) -> Option<Vec<Value>> {
    let span = extract_json_array(text)?;
    match serde_json::from_str(span) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}
