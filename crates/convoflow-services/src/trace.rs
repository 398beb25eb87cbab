//! Capturing HTTP exchanges as raw request/response traces.
//!
//! Every adapter sends its requests through [`do_trace`] so events can show
//! exactly what went over the wire, with secrets masked.

use std::time::Instant;

use chrono::Utc;
use convoflow_engine::types::{CallStatus, HttpLog};
use convoflow_engine::ServiceError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Request};

/// Replaces secrets in traces.
pub const REDACTION_MASK: &str = "****************";

/// One request and, if the server answered, its response.
#[derive(Debug, Clone)]
pub(crate) struct Trace {
    pub url: String,
    pub method: String,
    pub request: String,
    pub status: Option<u16>,
    /// Status line and headers.
    pub response: String,
    pub body: Vec<u8>,
    pub elapsed_ms: u64,
    /// Why no response was received.
    pub error: Option<String>,
}

impl Trace {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(code) if (200..300).contains(&code))
    }

    /// The trace as a log entry with the given secrets masked.
    pub fn http_log(&self, secrets: &[&str]) -> HttpLog {
        let mut response = self.response.clone();
        response.push_str(&String::from_utf8_lossy(&self.body));

        HttpLog {
            url: redact(&self.url, secrets),
            status_code: self.status,
            status: CallStatus::from_response(self.status, false),
            request: redact(&self.request, secrets),
            response: redact(&response, secrets),
            elapsed_ms: self.elapsed_ms,
            retries: 0,
            created_on: Utc::now(),
        }
    }

    /// Fails unless the server answered with a 2xx.
    pub fn check(&self, service: &str) -> Result<(), ServiceError> {
        if let Some(error) = &self.error {
            return Err(ServiceError::Request {
                message: format!("{service} request failed: {error}"),
            });
        }
        if !self.is_success() {
            return Err(ServiceError::Response {
                message: format!(
                    "{service} request failed with status {}",
                    self.status.unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self, service: &str) -> Result<T, ServiceError> {
        serde_json::from_slice(&self.body).map_err(|e| ServiceError::Response {
            message: format!("unable to read {service} response: {e}"),
        })
    }
}

/// Sends a request, capturing the exchange. Connection failures are
/// recorded on the trace rather than returned. Bodies longer than
/// `max_body_bytes` are cut.
pub(crate) async fn do_trace(client: &Client, request: Request, max_body_bytes: usize) -> Trace {
    let url = request.url().to_string();
    let method = request.method().to_string();
    let request_trace = format_request(&request);
    let started = Instant::now();

    let mut trace = Trace {
        url,
        method,
        request: request_trace,
        status: None,
        response: String::new(),
        body: Vec::new(),
        elapsed_ms: 0,
        error: None,
    };

    match client.execute(request).await {
        Ok(response) => {
            let status = response.status();
            trace.status = Some(status.as_u16());
            trace.response = format!(
                "HTTP/1.1 {} {}\r\n{}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                format_headers(response.headers())
            );
            match response.bytes().await {
                Ok(bytes) => {
                    let end = bytes.len().min(max_body_bytes);
                    trace.body = bytes[..end].to_vec();
                }
                Err(e) => trace.error = Some(e.to_string()),
            }
        }
        Err(e) => {
            tracing::debug!(url = %trace.url, error = %e, "http request failed");
            trace.error = Some(e.to_string());
        }
    }

    trace.elapsed_ms = started.elapsed().as_millis() as u64;
    trace
}

fn format_request(request: &Request) -> String {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };

    let mut out = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\n{}\r\n",
        request.method(),
        target,
        host,
        format_headers(request.headers())
    );
    if let Some(body) = request.body().and_then(|b| b.as_bytes()) {
        out.push_str(&String::from_utf8_lossy(body));
    }
    out
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}\r\n",
                canonical_header(name.as_str()),
                value.to_str().unwrap_or_default()
            )
        })
        .collect()
}

/// `content-type` to `Content-Type`.
fn canonical_header(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTION_MASK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_canonical_header() {
        assert_eq!(canonical_header("content-type"), "Content-Type");
        assert_eq!(canonical_header("x-api-key"), "X-Api-Key");
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("Authorization: Bearer sesame", &["sesame", ""]),
            "Authorization: Bearer ****************"
        );
    }

    #[tokio::test]
    async fn test_do_trace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client
            .post(format!("{}/echo?x=1", server.uri()))
            .header("X-Request-Id", "abc")
            .body("hello")
            .build()
            .unwrap();

        let trace = do_trace(&client, request, 4).await;
        assert_eq!(trace.status, Some(201));
        assert!(trace.is_success());
        assert!(trace.request.starts_with("POST /echo?x=1 HTTP/1.1\r\n"));
        assert!(trace.request.contains("X-Request-Id: abc\r\n"));
        assert!(trace.request.ends_with("\r\n\r\nhello"));
        assert!(trace.response.starts_with("HTTP/1.1 201 Created\r\n"));
        assert_eq!(trace.body, b"crea");

        let log = trace.http_log(&["abc"]);
        assert_eq!(log.status, CallStatus::Success);
        assert!(log.request.contains("X-Request-Id: ****************"));
    }

    #[tokio::test]
    async fn test_do_trace_connection_error() {
        let client = Client::new();
        let request = client.get("http://127.0.0.1:1/nothing").build().unwrap();

        let trace = do_trace(&client, request, 1000).await;
        assert_eq!(trace.status, None);
        assert!(trace.error.is_some());
        assert!(trace.check("test").is_err());
        assert_eq!(trace.http_log(&[]).status, CallStatus::ConnectionError);
    }
}
