//! Response body decoding shared by the orchestrator.

use http::{header, StatusCode};
use serde_json::Value;

use crate::{core::AdaptResult, transport::TransportResponse};

/// Standard content types
pub mod content_type {
    pub const APPLICATION_JSON: &str = "application/json";
}

fn is_json(response: &TransportResponse) -> Option<bool> {
    let value = response.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = value.split(';').next().unwrap_or(value).trim();
    Some(mime == content_type::APPLICATION_JSON || mime.ends_with("+json"))
}

/// Decode a response body according to its content type.
///
/// Empty bodies become `null`, JSON is parsed, anything else is returned as
/// a string. Without a content type, JSON is attempted first.
pub fn parse_body(response: &TransportResponse) -> AdaptResult<Value> {
    if response.status == StatusCode::NO_CONTENT || response.body.is_empty() {
        return Ok(Value::Null);
    }

    let text = || Value::String(String::from_utf8_lossy(&response.body).into_owned());
    match is_json(response) {
        Some(true) => Ok(serde_json::from_slice(&response.body)?),
        Some(false) => Ok(text()),
        None => Ok(serde_json::from_slice(&response.body).unwrap_or_else(|_| text())),
    }
}
