//! Interfaces to the external services some actions call out to.
//!
//! The engine holds one factory per service kind. Factories are called at
//! execution time with the asset being used (classifier, LLM) so a service
//! can be configured per asset. HTTP implementations live in the
//! `convoflow-services` crate.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;
use uuid::Uuid;

use crate::assets::{Classifier, Llm};
use crate::errors::ServiceError;
use crate::types::{Environment, HttpLog, Urn, WebhookCall};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub value: String,
    pub confidence: f64,
}

/// Intents and entities found in a piece of text, best intent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub intents: Vec<ExtractedIntent>,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<ExtractedEntity>>,
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Classifies input text. HTTP exchanges are appended to `logs` whether
    /// or not the call succeeds.
    async fn classify(
        &self,
        env: &Environment,
        input: &str,
        logs: &mut Vec<HttpLog>,
    ) -> Result<Classification, ServiceError>;
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub output: String,
    pub tokens_used: i64,
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn response(
        &self,
        env: &Environment,
        instructions: &str,
        input: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, ServiceError>;
}

// ---------------------------------------------------------------------------
// Airtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirtimeTransfer {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Urn>,
    pub recipient: Urn,
    pub currency: String,
    pub desired_amount: Number,
    pub actual_amount: Number,
}

/// A failed transfer, which may still have got far enough to create a
/// transfer record.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AirtimeError {
    pub error: ServiceError,
    pub transfer: Option<AirtimeTransfer>,
}

#[async_trait]
pub trait AirtimeService: Send + Sync {
    /// Transfers airtime to the recipient in the first currency of
    /// `amounts` that the recipient's operator supports.
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Number>,
        logs: &mut Vec<HttpLog>,
    ) -> Result<AirtimeTransfer, AirtimeError>;
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl WebhookRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

#[async_trait]
pub trait WebhookService: Send + Sync {
    /// Makes the call. A connection failure or error status is still a
    /// completed call; `Err` means the request couldn't be made at all.
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, ServiceError>;
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, addresses: &[String], subject: &str, body: &str)
        -> Result<(), ServiceError>;
}

// ---------------------------------------------------------------------------
// Service factories
// ---------------------------------------------------------------------------

pub type ClassificationFactory =
    Arc<dyn Fn(&Classifier) -> Result<Arc<dyn ClassificationService>, ServiceError> + Send + Sync>;
pub type LlmFactory =
    Arc<dyn Fn(&Llm) -> Result<Arc<dyn LlmService>, ServiceError> + Send + Sync>;
pub type AirtimeFactory =
    Arc<dyn Fn() -> Result<Arc<dyn AirtimeService>, ServiceError> + Send + Sync>;
pub type WebhookFactory =
    Arc<dyn Fn(Duration) -> Result<Arc<dyn WebhookService>, ServiceError> + Send + Sync>;
pub type EmailFactory =
    Arc<dyn Fn() -> Result<Arc<dyn EmailService>, ServiceError> + Send + Sync>;

/// The service factories an engine was built with.
#[derive(Clone, Default)]
pub struct Services {
    pub(crate) classification: Option<ClassificationFactory>,
    pub(crate) llm: Option<LlmFactory>,
    pub(crate) airtime: Option<AirtimeFactory>,
    pub(crate) webhook: Option<WebhookFactory>,
    pub(crate) email: Option<EmailFactory>,
}

fn not_configured(service: &str) -> ServiceError {
    ServiceError::NotConfigured {
        service: service.to_string(),
    }
}

impl Services {
    pub fn classification(
        &self,
        classifier: &Classifier,
    ) -> Result<Arc<dyn ClassificationService>, ServiceError> {
        let factory = self
            .classification
            .as_ref()
            .ok_or_else(|| not_configured("classification"))?;
        factory(classifier)
    }

    pub fn llm(&self, llm: &Llm) -> Result<Arc<dyn LlmService>, ServiceError> {
        let factory = self.llm.as_ref().ok_or_else(|| not_configured("LLM"))?;
        factory(llm)
    }

    pub fn airtime(&self) -> Result<Arc<dyn AirtimeService>, ServiceError> {
        let factory = self
            .airtime
            .as_ref()
            .ok_or_else(|| not_configured("airtime"))?;
        factory()
    }

    pub fn webhook(&self, timeout: Duration) -> Result<Arc<dyn WebhookService>, ServiceError> {
        let factory = self
            .webhook
            .as_ref()
            .ok_or_else(|| not_configured("webhook"))?;
        factory(timeout)
    }

    pub fn email(&self) -> Result<Arc<dyn EmailService>, ServiceError> {
        let factory = self.email.as_ref().ok_or_else(|| not_configured("email"))?;
        factory()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("classification", &self.classification.is_some())
            .field("llm", &self.llm.is_some())
            .field("airtime", &self.airtime.is_some())
            .field("webhook", &self.webhook.is_some())
            .field("email", &self.email.is_some())
            .finish()
    }
}
