//! Events recording calls to webhooks and external services.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::run::SessionHistory;
use crate::types::{
    CallStatus, ClassifierReference, ContactReference, FlowReference, GroupReference, HttpLog,
    LlmReference, Urn,
};

/// How a webhook response body was turned into JSON for `@webhook`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    /// No body.
    #[default]
    None,
    /// Body isn't JSON.
    Ignored,
    Valid,
    /// Body is JSON once NULs and invalid UTF-8 are removed.
    Cleaned,
}

/// `webhook_called`: one HTTP call, including each resthook subscriber call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCalled {
    pub url: String,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub retries: u32,
    pub request: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resthook: String,
}

/// `resthook_called`: the payload sent to every subscriber of a resthook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResthookCalled {
    pub resthook: String,
    pub payload: Value,
}

/// `service_called`: a classifier or LLM was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCalled {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_logs: Vec<HttpLog>,
}

impl ServiceCalled {
    pub fn classifier(classifier: ClassifierReference, http_logs: Vec<HttpLog>) -> Self {
        Self {
            service: "classifier".into(),
            classifier: Some(classifier),
            llm: None,
            http_logs,
        }
    }

    pub fn llm(llm: LlmReference, http_logs: Vec<HttpLog>) -> Self {
        Self {
            service: "llm".into(),
            classifier: None,
            llm: Some(llm),
            http_logs,
        }
    }
}

/// `classifier_called`: older form of `service_called`, still readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierCalled {
    pub classifier: ClassifierReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_logs: Vec<HttpLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCalled {
    pub llm: LlmReference,
    pub instructions: String,
    pub input: String,
    pub output: String,
    pub tokens_used: i64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirtimeTransferred {
    pub transfer_uuid: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Urn>,
    pub recipient: Urn,
    pub currency: String,
    pub amount: Number,
    #[serde(default)]
    pub http_logs: Vec<HttpLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSent {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Which contacts a triggered session should skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusions {
    #[serde(default)]
    pub in_a_flow: bool,
}

/// `session_triggered`: the caller should start new sessions for the
/// given recipients. `run_summary` describes the triggering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTriggered {
    pub flow: FlowReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<ContactReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contact_query: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_contact: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urns: Vec<Urn>,
    #[serde(default)]
    pub exclusions: Exclusions,
    /// Whether the new sessions should interrupt any waiting ones.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupt: bool,
    pub run_summary: Value,
    pub history: SessionHistory,
}
