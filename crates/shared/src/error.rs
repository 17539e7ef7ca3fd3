use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            400 | 422 => Self::Validation,
            _ => Self::Internal,
        }
    }
}

/// A single user-presentable message derived from an upstream error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds the error for a failed response, using `fallback` when the body
    /// carries nothing usable.
    pub fn from_response(status: u16, body: &str, fallback: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| describe_error_body(&value))
            .unwrap_or_else(|| fallback.to_string());
        Self::new(ErrorCode::from_status(status), message)
    }
}

/// Picks the most specific message out of an error body: `detail`, then
/// `message`, then the first field-level validation error.
pub fn describe_error_body(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    for key in ["detail", "message"] {
        if let Some(text) = object.get(key).and_then(first_text) {
            return Some(text);
        }
    }

    object.iter().find_map(|(field, value)| {
        first_text(value).map(|text| format!("{}: {text}", title_case_field(field)))
    })
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

/// `postal_code` -> `Postal Code`
pub fn title_case_field(field: &str) -> String {
    field
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
