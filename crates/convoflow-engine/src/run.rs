//! The run and session seams actions execute against.
//!
//! Runs and sessions are owned by the interpreter that walks flow graphs.
//! Actions, modifiers and events only see them through these traits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assets::{Flow, FlowType, SessionAssets};
use crate::engine::Engine;
use crate::events::Event;
use crate::modifiers::Modifier;
use crate::types::{
    ChannelReference, Contact, Environment, FlowReference, MsgIn, Results, RunResult, Urn,
    WebhookCall,
};

/// Receives events in the order they happen.
pub type EventCallback<'a> = dyn FnMut(Event) + Send + 'a;

/// Receives modifiers applied to the contact, before their events.
pub type ModifierCallback<'a> = dyn FnMut(Modifier) + Send + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Waiting,
    Completed,
    Interrupted,
    Expired,
    Failed,
    Errored,
}

impl RunStatus {
    pub fn is_ended(self) -> bool {
        !matches!(self, Self::Active | Self::Waiting)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// A visit to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub uuid: Uuid,
    pub node_uuid: Uuid,
    pub arrived_on: DateTime<Utc>,
}

impl Step {
    pub fn new(node_uuid: Uuid) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            node_uuid,
            arrived_on: Utc::now(),
        }
    }
}

/// How a session came to be, used to stop sessions triggering each other forever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<Uuid>,
    pub ancestors: u32,
    pub ancestors_since_input: u32,
}

impl SessionHistory {
    /// History for a session triggered by the given session.
    pub fn for_child(parent_uuid: Uuid, parent: &SessionHistory, parent_had_input: bool) -> Self {
        Self {
            parent_uuid: Some(parent_uuid),
            ancestors: parent.ancestors + 1,
            ancestors_since_input: if parent_had_input {
                0
            } else {
                parent.ancestors_since_input + 1
            },
        }
    }
}

/// The voice call a session is happening over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub uuid: Uuid,
    pub channel: ChannelReference,
    pub urn: Urn,
}

/// Run-scoped variables, not persisted to results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locals(BTreeMap<String, String>);

impl Locals {
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn clear(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// What another session is told about the run that triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub uuid: Uuid,
    pub flow: FlowReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<&'a Contact>,
    pub status: RunStatus,
    pub results: &'a Results,
}

pub trait Session: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn session_type(&self) -> FlowType;

    fn engine(&self) -> &Arc<Engine>;

    fn assets(&self) -> &Arc<SessionAssets>;

    fn environment(&self) -> &Environment;

    fn set_environment(&mut self, env: Environment);

    fn contact(&self) -> Option<&Contact>;

    fn contact_mut(&mut self) -> Option<&mut Contact>;

    fn set_contact(&mut self, contact: Contact);

    /// The voice call, for voice sessions.
    fn call(&self) -> Option<&Call>;

    /// The message that started or last resumed the session.
    fn input(&self) -> Option<&MsgIn>;

    fn history(&self) -> &SessionHistory;

    /// Whether the session is one of many started together, e.g. by a broadcast.
    fn batch_start(&self) -> bool;

    /// Flows of the runs currently on the stack, outermost first.
    fn flow_stack(&self) -> Vec<Uuid>;

    /// Starts a run of `flow` on top of the stack. Terminal entries replace
    /// the current run rather than returning to it.
    fn push_flow(&mut self, flow: Arc<Flow>, parent_run: Uuid, terminal: bool);

    /// The environment with the contact's language and timezone merged in.
    fn merged_environment(&self) -> Environment {
        let env = self.environment();
        match self.contact() {
            Some(contact) => {
                let tz = contact.timezone().map(|tz| tz.name().to_string());
                env.merged(contact.language(), tz.as_deref())
            }
            None => env.clone(),
        }
    }

    /// Whether `flow` isn't already running in this session.
    fn can_enter_flow(&self, flow: &Flow) -> bool {
        !self.flow_stack().contains(&flow.uuid)
    }
}

pub trait Run: Send {
    fn uuid(&self) -> Uuid;

    fn flow(&self) -> &Arc<Flow>;

    fn session(&self) -> &dyn Session;

    fn session_mut(&mut self) -> &mut dyn Session;

    /// Evaluates a template, logging evaluation errors as events. Returns
    /// what could be evaluated and whether there were no errors.
    fn evaluate_template(&self, template: &str, log: &mut EventCallback<'_>) -> (String, bool);

    /// Localized values of an item property in the first of `languages`
    /// with a translation, falling back to `native`.
    fn get_text_array(
        &self,
        item: Uuid,
        property: &str,
        native: &[String],
        languages: &[String],
    ) -> (Vec<String>, Option<String>);

    fn locals(&self) -> &Locals;

    fn locals_mut(&mut self) -> &mut Locals;

    fn results(&self) -> &Results;

    /// Saves a result, returning the previous one and whether it changed.
    fn set_result(&mut self, result: RunResult) -> (Option<RunResult>, bool);

    fn webhook(&self) -> Option<&WebhookCall>;

    fn set_webhook(&mut self, call: Option<WebhookCall>);

    fn status(&self) -> RunStatus;

    fn exit(&mut self, status: RunStatus);

    fn flow_reference(&self) -> FlowReference {
        self.flow().reference()
    }

    fn contact(&self) -> Option<&Contact> {
        self.session().contact()
    }

    fn contact_mut(&mut self) -> Option<&mut Contact> {
        self.session_mut().contact_mut()
    }

    /// Single localized text value.
    fn get_text(&self, item: Uuid, property: &str, native: &str, languages: &[String]) -> String {
        let (values, _) = self.get_text_array(item, property, &[native.to_string()], languages);
        values.into_iter().next().unwrap_or_default()
    }

    /// JSON summary of this run, passed to sessions it triggers.
    fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(RunSummary {
            uuid: self.uuid(),
            flow: self.flow_reference(),
            contact: self.contact(),
            status: self.status(),
            results: self.results(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_history() {
        let parent = SessionHistory {
            parent_uuid: None,
            ancestors: 2,
            ancestors_since_input: 1,
        };
        let child = SessionHistory::for_child(Uuid::nil(), &parent, false);
        assert_eq!(child.ancestors, 3);
        assert_eq!(child.ancestors_since_input, 2);

        let child = SessionHistory::for_child(Uuid::nil(), &parent, true);
        assert_eq!(child.ancestors_since_input, 0);
    }

    #[test]
    fn test_locals() {
        let mut locals = Locals::default();
        assert_eq!(locals.get("count"), "");
        locals.set("count", "3");
        assert_eq!(locals.get("count"), "3");
        locals.clear("count");
        assert_eq!(locals.get("count"), "");
    }

    #[test]
    fn test_run_status() {
        assert!(RunStatus::Errored.is_ended());
        assert!(!RunStatus::Waiting.is_ended());
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }
}
