//! HTTP call records shared by webhook and service events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Max bytes of a request or response trace stored on events.
pub const MAX_TRACE_BYTES: usize = 10000;

/// Outcome of an outbound HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Older records mark resthook subscribers that answered 410 as gone.
    #[serde(alias = "subscriber_gone")]
    Success,
    ConnectionError,
    ResponseError,
}

impl CallStatus {
    /// Derives the status from an optional response code. Resthook
    /// subscribers answering 410 are treated as a successful call.
    pub fn from_response(status_code: Option<u16>, resthook: bool) -> Self {
        match status_code {
            None => Self::ConnectionError,
            Some(410) if resthook => Self::Success,
            Some(code) if (200..300).contains(&code) => Self::Success,
            Some(_) => Self::ResponseError,
        }
    }
}

/// One HTTP exchange made by a service, recorded on service events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLog {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub status: CallStatus,
    pub request: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub retries: u32,
    pub created_on: DateTime<Utc>,
}

/// A completed (or failed to connect) webhook call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WebhookCall {
    pub url: String,
    pub method: String,
    /// Raw HTTP request as sent.
    pub request_trace: String,
    /// Status line and headers, empty if there was no response.
    pub response_trace: String,
    pub response_status: Option<u16>,
    pub response_body: Vec<u8>,
    pub elapsed_ms: u64,
    pub retries: u32,
}

impl WebhookCall {
    /// Response body parsed as JSON, if it is JSON.
    pub fn response_json(&self) -> Option<Value> {
        if self.response_body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.response_body).ok()
    }

    /// Full response (trace plus body) as text.
    pub fn response(&self) -> Vec<u8> {
        let mut out = self.response_trace.clone().into_bytes();
        out.extend_from_slice(&self.response_body);
        out
    }
}

/// Truncates text to `max` bytes on a char boundary, marking the cut with
/// a trailing `...` which counts towards the limit.
pub fn truncate_ellipsis(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max.saturating_sub(3);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Truncates to a number of chars rather than bytes.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_status() {
        assert_eq!(CallStatus::from_response(None, false), CallStatus::ConnectionError);
        assert_eq!(CallStatus::from_response(Some(200), false), CallStatus::Success);
        assert_eq!(CallStatus::from_response(Some(201), true), CallStatus::Success);
        assert_eq!(CallStatus::from_response(Some(410), true), CallStatus::Success);
        assert_eq!(
            CallStatus::from_response(Some(410), false),
            CallStatus::ResponseError
        );
        assert_eq!(
            CallStatus::from_response(Some(503), true),
            CallStatus::ResponseError
        );
    }

    #[test]
    fn test_call_status_wire_names() {
        assert_eq!(
            serde_json::to_value(CallStatus::ConnectionError).unwrap(),
            serde_json::json!("connection_error")
        );
        let gone: CallStatus = serde_json::from_value(serde_json::json!("subscriber_gone")).unwrap();
        assert_eq!(gone, CallStatus::Success);
        assert_eq!(serde_json::to_value(gone).unwrap(), serde_json::json!("success"));
    }

    #[test]
    fn test_truncate_ellipsis() {
        let long = "X".repeat(20000);
        let truncated = truncate_ellipsis(&long, MAX_TRACE_BYTES);
        assert_eq!(truncated.len(), MAX_TRACE_BYTES);
        assert!(truncated.ends_with("XXXXXXX..."));
        assert_eq!(truncate_ellipsis("short", 10), "short");
    }
}
