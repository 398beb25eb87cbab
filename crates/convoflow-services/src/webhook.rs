//! Webhook and resthook calls over HTTP.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use convoflow_engine::services::{WebhookRequest, WebhookService};
use convoflow_engine::types::WebhookCall;
use convoflow_engine::ServiceError;
use regex::{Captures, Regex};
use reqwest::{Client, Method};

use crate::trace::do_trace;

/// Default cap on response bodies kept from webhook calls.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

static ESCAPED_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\+u0{4}").expect("valid regex"));

/// Calls webhooks with a shared client. Headers set on the service are
/// sent unless the request sets them itself.
#[derive(Debug, Clone)]
pub struct HttpWebhookService {
    client: Client,
    default_headers: BTreeMap<String, String>,
    max_body_bytes: usize,
}

impl HttpWebhookService {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Request {
                message: format!("unable to create HTTP client: {e}"),
            })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("User-Agent".to_string(), "convoflow".to_string());
        Self {
            client,
            default_headers,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

#[async_trait]
impl WebhookService for HttpWebhookService {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, ServiceError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            ServiceError::Request {
                message: format!("invalid method '{}': {e}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &self.default_headers {
            if !request.headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in &request.headers {
            // the client negotiates compression itself and only decodes what it asked for
            if name.eq_ignore_ascii_case("accept-encoding") && value == "gzip" {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        let built = builder.build().map_err(|e| ServiceError::Request {
            message: format!("unable to create webhook request: {e}"),
        })?;

        let trace = do_trace(&self.client, built, self.max_body_bytes).await;
        if let Some(error) = &trace.error {
            tracing::warn!(url = %trace.url, error = %error, "webhook call failed");
        }

        Ok(WebhookCall {
            url: trace.url,
            method: trace.method,
            request_trace: trace.request,
            response_trace: trace.response,
            response_status: trace.status,
            response_body: clean_body(trace.body),
            elapsed_ms: trace.elapsed_ms,
            retries: 0,
        })
    }
}

/// Keeps a JSON body storable: invalid UTF-8 is replaced and escaped NULs
/// become the replacement character. Non-JSON bodies are left alone.
fn clean_body(body: Vec<u8>) -> Vec<u8> {
    if body.is_empty() {
        return body;
    }
    let text = String::from_utf8_lossy(&body);
    let cleaned = replace_escaped_nulls(&text);
    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        cleaned.into_bytes()
    } else {
        body
    }
}

/// Replaces the `\u0000` escape with `\ufffd`. `\\u0000` is an escaped
/// slash followed by text and is kept.
fn replace_escaped_nulls(text: &str) -> String {
    ESCAPED_NULL
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            let slashes = matched.chars().filter(|c| *c == '\\').count();
            if slashes % 2 == 0 {
                matched.to_string()
            } else {
                format!("{}\\ufffd", "\\".repeat(slashes - 1))
            }
        })
        .into_owned()
}
