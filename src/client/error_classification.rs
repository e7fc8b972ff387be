//! Error classification for terminal non-success responses.

use crate::error::{HttpError, RestError};
use crate::types::Method;
use crate::Error;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{Map, Value};

pub(crate) struct ErrorClassifier;

impl ErrorClassifier {
    /// Build the caller-facing error for a terminal response.
    ///
    /// A JSON body with a numeric `code` is a vendor error; anything else is a
    /// generic HTTP error.
    pub fn classify(
        method: Method,
        path: &str,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Error {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let raw_body = parsed.clone().or_else(|| {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            (!text.is_empty()).then(|| Value::String(text.to_string()))
        });

        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_i64);

        if let (Some(code), Some(Value::Object(obj))) = (code, parsed.as_ref()) {
            let top = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Error");
            let field_errors = match obj.get("errors") {
                Some(Value::Object(errors)) => flatten_errors(errors, ""),
                _ => flatten_errors(obj, ""),
            };

            let mut message = format!("{} on {} {}", top, method, path);
            for line in &field_errors {
                message.push_str("\n ");
                message.push_str(line);
            }

            return Error::Rest(RestError {
                http: HttpError {
                    method,
                    path: path.to_string(),
                    status,
                    status_text,
                    headers: headers.clone(),
                    body: raw_body,
                    message,
                },
                code,
                field_errors,
            });
        }

        let mut message = format!("{} {} on {} {}", status.as_u16(), status_text, method, path);
        if let Some(Value::Object(obj)) = parsed.as_ref() {
            for (key, value) in obj {
                if let Some(items) = value.as_array() {
                    for item in items.iter().filter_map(Value::as_str) {
                        message.push_str(&format!("\n  {}: {}", key, item));
                    }
                }
            }
        }

        Error::Http(HttpError {
            method,
            path: path.to_string(),
            status,
            status_text,
            headers: headers.clone(),
            body: raw_body,
            message,
        })
    }
}

/// Flatten a nested field-error tree into `"a.b: message"` lines, in key order.
pub fn flatten_errors(errors: &Map<String, Value>, prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, value) in errors {
        if key == "message" || key == "code" {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Object(obj) => {
                if let Some(Value::Array(entries)) = obj.get("_errors") {
                    for entry in entries {
                        let msg = entry
                            .get("message")
                            .and_then(Value::as_str)
                            .or_else(|| entry.as_str())
                            .unwrap_or("Unknown Error");
                        lines.push(format!("{}: {}", path, msg));
                    }
                } else {
                    lines.extend(flatten_errors(obj, &path));
                }
            }
            Value::Array(items) => {
                for item in items.iter().filter_map(Value::as_str) {
                    lines.push(format!("{}: {}", path, item));
                }
            }
            _ => {}
        }
    }
    lines
}
