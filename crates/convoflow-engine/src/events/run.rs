//! Run lifecycle, result and log events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::run::RunStatus;
use crate::types::{Environment, FlowReference, RunResult};

/// `run_result_changed`: a result was saved on the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResultChanged {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category_localized: String,
    pub node_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<String>,
}

impl RunResultChanged {
    pub fn new(result: &RunResult, previous: Option<&RunResult>) -> Self {
        Self {
            name: result.name.clone(),
            value: result.value.clone(),
            category: result.category.clone(),
            category_localized: result.category_localized.clone(),
            node_uuid: result.node_uuid,
            input: result.input.clone(),
            extra: result.extra.clone(),
            previous_value: previous.map(|p| p.value.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_uuid: Uuid,
    pub flow: FlowReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEnded {
    pub run_uuid: Uuid,
    pub flow: FlowReference,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResumed {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunExpired {
    pub run_uuid: Uuid,
}

/// `flow_entered`: a child run was started by `enter_flow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntered {
    pub flow: FlowReference,
    pub parent_run_uuid: Uuid,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRefreshed {
    pub environment: Environment,
}

/// `error`: something went wrong that the flow can carry on from, unless
/// `fatal` is set, in which case the run errored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fatal: bool,
}

/// `failure`: the run failed, e.g. a required precondition wasn't met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEvent {
    pub text: String,
}
