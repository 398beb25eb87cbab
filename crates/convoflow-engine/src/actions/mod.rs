//! Actions: what a flow node does when a run visits it.
//!
//! Actions are read once when a flow is loaded and are immutable after
//! that. Executing one evaluates its templates against the run, resolves
//! the assets it references, and reports what happened through two
//! callbacks: modifiers applied to the contact, and events. Anything a flow
//! can carry on from is logged as an error event; only conditions that
//! must abort the run come back as [`ActionError`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assets::SessionAssets;
use crate::errors::{ActionError, ReadError};
use crate::events::Event;
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{AssetReference, ResultInfo};

/// Implements the parts of [`Action`] every action gets from its base.
macro_rules! impl_base {
    () => {
        fn type_name(&self) -> &str {
            &self.base.type_name
        }

        fn uuid(&self) -> uuid::Uuid {
            self.base.uuid
        }

        fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
            serde_json::to_value(self)
        }
    };
}

mod base;
pub mod contact;
pub mod flows;
pub mod groups;
pub mod labels;
pub mod messaging;
pub mod optins;
mod registry;
pub mod results;
pub mod services;
pub mod tickets;
pub mod voice;
pub mod webhook;

pub use base::{OtherContacts, WEBHOOK_CATEGORIES};
pub use registry::{read_action, ActionRegistry, ACTION_TYPES};

/// Fields every action has: its type and its UUID within the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBase {
    #[serde(rename = "type")]
    pub type_name: String,
    pub uuid: Uuid,
}

impl ActionBase {
    pub fn new(type_name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            type_name: type_name.into(),
            uuid,
        }
    }
}

/// Receives each asset an action references.
pub type DependencyCallback<'a> = dyn FnMut(AssetReference) + 'a;
/// Receives each run local an action writes.
pub type LocalCallback<'a> = dyn FnMut(&str) + 'a;
/// Receives each result an action saves.
pub type ResultCallback<'a> = dyn FnMut(ResultInfo) + 'a;

#[async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    /// The type discriminator, e.g. `send_msg`.
    fn type_name(&self) -> &str;

    fn uuid(&self) -> Uuid;

    /// Checks rules across fields that decoding alone can't.
    fn validate(&self) -> Result<(), ReadError> {
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError>;

    /// Reports the assets this action references, the locals it writes and
    /// the results it saves.
    fn inspect(
        &self,
        _dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
    }

    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

/// Everything [`Action::inspect`] reported, collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    pub dependencies: Vec<AssetReference>,
    pub locals: Vec<String>,
    pub results: Vec<ResultInfo>,
}

pub fn inspect(action: &dyn Action) -> Inspection {
    let mut inspection = Inspection::default();
    let Inspection {
        dependencies,
        locals,
        results,
    } = &mut inspection;
    action.inspect(
        &mut |r: AssetReference| dependencies.push(r),
        &mut |l: &str| locals.push(l.to_string()),
        &mut |r: ResultInfo| results.push(r),
    );
    inspection
}

/// Checks that every asset an action references by identity exists.
/// References by name are resolved at execution time and aren't checked.
pub fn validate_dependencies(action: &dyn Action, assets: &SessionAssets) -> Result<(), ReadError> {
    let missing: Vec<String> = inspect(action)
        .dependencies
        .iter()
        .filter(|r| !r.is_variable() && !assets.contains(r))
        .map(ToString::to_string)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(ReadError::validation(format!(
        "missing dependencies: {}",
        missing.join(", ")
    )))
}

/// Executes an action, stamping the events it logs with the step.
pub async fn execute(
    action: &dyn Action,
    run: &mut dyn Run,
    step: &Step,
    log_modifier: &mut ModifierCallback<'_>,
    log_event: &mut EventCallback<'_>,
) -> Result<(), ActionError> {
    let step_uuid = step.uuid;
    let mut stamped = |event: Event| log_event(event.with_step(step_uuid));

    let result = action.execute(run, step, log_modifier, &mut stamped).await;
    if let Err(e) = &result {
        tracing::warn!(
            action = %action.uuid(),
            action_type = action.type_name(),
            run = %run.uuid(),
            error = %e,
            "action execution aborted run"
        );
    }
    result
}
