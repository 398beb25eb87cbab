//! LLM client for OpenAI-compatible chat completion APIs.

use std::time::Duration;

use async_trait::async_trait;
use convoflow_engine::assets::Llm;
use convoflow_engine::services::{LlmResponse, LlmService};
use convoflow_engine::types::Environment;
use convoflow_engine::ServiceError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}

/// Sends instructions as the system message and the input as the user
/// message, returning the first choice.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleLlm {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleLlm {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Request {
                message: format!("unable to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// A client for the model named by an LLM asset.
    pub fn for_llm(
        llm: &Llm,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Self::new(base_url, api_key, llm.model.clone(), timeout)
    }

    fn api_url(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }
}

#[async_trait]
impl LlmService for OpenAiCompatibleLlm {
    async fn response(
        &self,
        _env: &Environment,
        instructions: &str,
        input: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            max_tokens,
            temperature: 0.0,
        };

        let mut request = self.client.post(self.api_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ServiceError::Request {
            message: format!("LLM request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(model = %self.model, status = %status, "LLM request failed");
            return Err(ServiceError::Response {
                message: format!("LLM request failed with status {}: {error_text}", status.as_u16()),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| ServiceError::Response {
            message: format!("unable to read LLM response: {e}"),
        })?;

        let output = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::Response {
                message: "LLM response has no choices".into(),
            })?;

        Ok(LlmResponse {
            output,
            tokens_used: chat.usage.map(|u| u.total_tokens).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm(server: &MockServer) -> OpenAiCompatibleLlm {
        OpenAiCompatibleLlm::new(
            &server.uri(),
            Some("sk-test".into()),
            "gpt-4o",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_api_url() {
        let timeout = Duration::from_secs(1);
        let url = |base: &str| OpenAiCompatibleLlm::new(base, None, "m", timeout).unwrap().api_url();
        assert_eq!(url("http://host/"), "http://host/v1/chat/completions");
        assert_eq!(url("http://host/v1"), "http://host/v1/chat/completions");
        assert_eq!(url("http://host/v1/chat/completions"), "http://host/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "max_tokens": 2500,
                "messages": [
                    {"role": "system", "content": "Translate to French"},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
            })))
            .mount(&server)
            .await;

        let response = llm(&server)
            .response(&Environment::default(), "Translate to French", "Hello", 2500)
            .await
            .unwrap();
        assert_eq!(response.output, "Bonjour");
        assert_eq!(response.tokens_used, 12);
    }

    #[tokio::test]
    async fn test_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = llm(&server)
            .response(&Environment::default(), "x", "y", 10)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "LLM request failed with status 429: slow down");
    }
}
