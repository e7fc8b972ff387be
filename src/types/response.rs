use crate::Result;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum RestResponse {
    /// 2xx with an empty body (e.g. `204 No Content`).
    NoContent,
    Json(serde_json::Value),
    Text(String),
}

impl RestResponse {
    pub(crate) fn decode(headers: &HeaderMap, body: &[u8]) -> Result<Self> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(RestResponse::NoContent);
        }

        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        if is_json {
            return Ok(RestResponse::Json(serde_json::from_slice(body)?));
        }

        match serde_json::from_slice(body) {
            Ok(value) => Ok(RestResponse::Json(value)),
            Err(_) => Ok(RestResponse::Text(String::from_utf8_lossy(body).into_owned())),
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, RestResponse::NoContent)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            RestResponse::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Deserialize into a caller type. `NoContent` deserializes from `null`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            RestResponse::NoContent => serde_json::Value::Null,
            RestResponse::Json(v) => v,
            RestResponse::Text(s) => serde_json::Value::String(s),
        };
        Ok(serde_json::from_value(value)?)
    }
}
