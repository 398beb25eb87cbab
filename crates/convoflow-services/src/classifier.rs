//! Wit.ai classification client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use convoflow_engine::services::{
    Classification, ClassificationService, ExtractedEntity, ExtractedIntent,
};
use convoflow_engine::types::{Environment, HttpLog};
use convoflow_engine::ServiceError;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::trace::do_trace;

const WIT_API_URL: &str = "https://api.wit.ai";
const WIT_API_VERSION: &str = "20200513";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    intents: Vec<IntentMatch>,
    #[serde(default)]
    entities: BTreeMap<String, Vec<EntityMatch>>,
}

#[derive(Debug, Deserialize)]
struct IntentMatch {
    name: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct EntityMatch {
    name: String,
    value: serde_json::Value,
    confidence: f64,
}

/// Classifies text with a Wit.ai app. Access tokens are masked in logs.
#[derive(Debug, Clone)]
pub struct WitClassifier {
    client: Client,
    base_url: String,
    access_token: String,
}

impl WitClassifier {
    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: WIT_API_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Use a different API host, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn message_url(&self, input: &str) -> Result<Url, ServiceError> {
        let mut url =
            Url::parse(&format!("{}/message", self.base_url)).map_err(|e| ServiceError::Request {
                message: format!("invalid wit.ai URL: {e}"),
            })?;
        url.query_pairs_mut()
            .append_pair("v", WIT_API_VERSION)
            .append_pair("q", input);
        Ok(url)
    }
}

#[async_trait]
impl ClassificationService for WitClassifier {
    async fn classify(
        &self,
        _env: &Environment,
        input: &str,
        logs: &mut Vec<HttpLog>,
    ) -> Result<Classification, ServiceError> {
        let request = self
            .client
            .get(self.message_url(input)?)
            .bearer_auth(&self.access_token)
            .build()
            .map_err(|e| ServiceError::Request {
                message: format!("unable to create wit.ai request: {e}"),
            })?;

        let trace = do_trace(&self.client, request, usize::MAX).await;
        logs.push(trace.http_log(&[&self.access_token]));
        trace.check("wit.ai")?;
        let response: MessageResponse = trace.json("wit.ai")?;

        // entity keys are "name:role", entities are keyed by name alone
        let mut entities: BTreeMap<String, Vec<ExtractedEntity>> = BTreeMap::new();
        for matches in response.entities.into_values() {
            for m in matches {
                let value = match m.value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                entities.entry(m.name).or_default().push(ExtractedEntity {
                    value,
                    confidence: m.confidence,
                });
            }
        }

        Ok(Classification {
            intents: response
                .intents
                .into_iter()
                .map(|i| ExtractedIntent {
                    name: i.name,
                    confidence: i.confidence,
                })
                .collect(),
            entities,
        })
    }
}
