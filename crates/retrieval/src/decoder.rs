//! Structured response decoder.
//!
//! Completion models are asked for bare JSON but often wrap it in a markdown
//! code fence or a sentence of prose. Decoding goes:
//!
//! 1. strip a surrounding ```` ``` ```` / ```` ```json ```` fence,
//! 2. parse the remainder as JSON,
//! 3. failing that, parse the outermost `[...]` or `{...}` span,
//! 4. check the value has the expected shape.
//!
//! Any failure is a [`DecodeError`]; callers decide whether that is fatal.

use std::collections::HashSet;

use {serde_json::Value, tracing::debug};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("response is empty")]
    Empty,

    #[error("response is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected shape: {0}")]
    Shape(&'static str),
}

/// Remove a markdown code fence around `raw`, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn outermost_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let close = if text[start..].starts_with('[') {
        ']'
    } else {
        '}'
    };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a completion response into a JSON value.
pub fn decode_json(raw: &str) -> Result<Value, DecodeError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(err) => match outermost_span(body) {
            Some(span) if span.len() < body.len() => {
                debug!("falling back to the embedded JSON span");
                Ok(serde_json::from_str(span)?)
            },
            _ => Err(err.into()),
        },
    }
}

/// The single array in an object like `{"keywords": [...]}` or `{"ids": [...]}`.
fn sole_array(map: &serde_json::Map<String, Value>, preferred: &[&str]) -> Option<Vec<Value>> {
    for key in preferred {
        if let Some(Value::Array(items)) = map.get(*key) {
            return Some(items.clone());
        }
    }
    let mut arrays = map.values().filter_map(Value::as_array);
    match (arrays.next(), arrays.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// Decode a keyword list: `{"keywords": ["a", "b"]}` or `["a", "b"]`.
///
/// Keywords are trimmed; blanks and duplicates are dropped, first occurrence wins.
pub fn decode_keywords(raw: &str) -> Result<Vec<String>, DecodeError> {
    let items = match decode_json(raw)? {
        Value::Array(items) => items,
        Value::Object(map) => sole_array(&map, &["keywords"])
            .ok_or(DecodeError::Shape("expected a \"keywords\" array"))?,
        _ => return Err(DecodeError::Shape("expected a list of keywords")),
    };

    let mut seen = HashSet::new();
    let mut keywords = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(text) = item else {
            return Err(DecodeError::Shape("keywords must be strings"));
        };
        let text = text.trim();
        if !text.is_empty() && seen.insert(text.to_string()) {
            keywords.push(text.to_string());
        }
    }
    Ok(keywords)
}

fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("message_id"))
            .and_then(id_from_value),
        _ => None,
    }
}

/// Decode a list of message ids: `[1, "2", {"id": 3}]` or an object holding
/// one such array (`{"ids": [...]}`, `{"message_ids": [...]}`).
///
/// Items that are not ids are skipped; a list with no usable id at all is an error.
pub fn decode_message_ids(raw: &str) -> Result<Vec<i64>, DecodeError> {
    let items = match decode_json(raw)? {
        Value::Array(items) => items,
        Value::Object(map) => sole_array(&map, &["ids", "message_ids", "selected_message_ids"])
            .ok_or(DecodeError::Shape("expected an array of message ids"))?,
        _ => return Err(DecodeError::Shape("expected a list of message ids")),
    };

    let ids: Vec<i64> = items.iter().filter_map(id_from_value).collect();
    if ids.is_empty() && !items.is_empty() {
        return Err(DecodeError::Shape("no message ids in the list"));
    }
    Ok(ids)
}
