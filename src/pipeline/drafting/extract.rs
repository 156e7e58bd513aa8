use std::sync::LazyLock;

use regex::Regex;

use super::ExtractionError;

/// Fenced ```json {…} ``` block. The language tag is optional because models
/// frequently drop it.
static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").expect("Invalid fenced JSON regex")
});

/// Reasoning artefacts some checkpoints emit after (or instead of) the answer.
const REASONING_MARKERS: &[&str] = &[
    "<thought>",
    "</thought>",
    "Here's a thinking process",
    "<unused",
];

/// Return the first JSON object in `text`.
///
/// A fenced block wins and is returned verbatim (not re-checked for balance;
/// the JSON decoder reports problems). Otherwise the first `{` is followed
/// until its matching `}`, tracking double-quoted strings and backslash
/// escapes so braces inside string values do not count.
pub fn extract_json_block(text: &str) -> Result<&str, ExtractionError> {
    if let Some(body) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Ok(body.as_str());
    }

    let start = text.find('{').ok_or(ExtractionError::NoJsonFound)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Every delimiter is ASCII, so byte offsets land on char boundaries.
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(ExtractionError::Unbalanced { start })
}

/// Normalise decoded model output before extraction: drop an echoed prompt,
/// cut at the first reasoning artefact, trim.
pub fn clean_generated_text(decoded: &str, prompt: &str) -> String {
    let mut text = decoded.trim_start();

    let prompt = prompt.trim();
    if !prompt.is_empty() {
        if let Some(rest) = text.strip_prefix(prompt) {
            text = rest;
        }
    }

    for marker in REASONING_MARKERS {
        if let Some(idx) = text.find(marker) {
            text = &text[..idx];
        }
    }

    text.trim().to_string()
}
