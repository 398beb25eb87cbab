//! Email sending through an HTTP relay.
//!
//! The relay receives `{"to": [...], "subject": "...", "body": "..."}` as
//! JSON and is responsible for delivery.

use async_trait::async_trait;
use convoflow_engine::services::EmailService;
use convoflow_engine::ServiceError;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
pub struct RelayEmailService {
    client: Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl RelayEmailService {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token: None,
            from: String::new(),
        }
    }

    /// Sent as a bearer token with every message.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn from_address(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }
}

#[async_trait]
impl EmailService for RelayEmailService {
    async fn send(&self, addresses: &[String], subject: &str, body: &str) -> Result<(), ServiceError> {
        let message = RelayMessage {
            to: addresses,
            from: (!self.from.is_empty()).then_some(self.from.as_str()),
            subject,
            body,
        };

        let mut request = self.client.post(&self.url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ServiceError::Request {
            message: format!("email relay request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, recipients = addresses.len(), "email relay rejected message");
            return Err(ServiceError::Response {
                message: format!("email relay returned status {}", status.as_u16()),
            });
        }
        Ok(())
    }
}
