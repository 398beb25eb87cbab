//! Saving run results and run locals.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::base::{languages, save_result};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::Event;
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{is_valid_result_name, truncate_chars, ResultInfo};

static LOCAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,63}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// set_run_result
// ---------------------------------------------------------------------------

/// Saves a result with an evaluated value and an optional category.
///
/// ```json
/// {
///   "type": "set_run_result",
///   "uuid": "...",
///   "name": "Gender",
///   "value": "m",
///   "category": "Male"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRunResult {
    #[serde(flatten)]
    pub base: ActionBase,
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
}

#[async_trait]
impl Action for SetRunResult {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if !is_valid_result_name(&self.name) {
            return Err(ReadError::validation(format!(
                "'{}' is not a valid result name",
                self.name
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let (value, ok) = run.evaluate_template(&self.value, log_event);
        if !ok {
            return Ok(());
        }

        let languages = languages(run);
        let mut category_localized =
            run.get_text(self.base.uuid, "category", &self.category, &languages);
        if category_localized == self.category {
            category_localized.clear();
        }

        save_result(
            run,
            step,
            &self.name,
            value.trim(),
            &self.category,
            &category_localized,
            None,
            None,
            log_event,
        );
        Ok(())
    }

    fn inspect(
        &self,
        _dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        let categories: Vec<&str> = Some(self.category.as_str())
            .filter(|c| !c.is_empty())
            .into_iter()
            .collect();
        result(ResultInfo::new(&self.name, &categories));
    }
}

// ---------------------------------------------------------------------------
// set_run_local
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalOperation {
    Set,
    Increment,
    Clear,
}

/// Sets, increments or clears a run local. Locals live only as long as the
/// run and produce no events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRunLocal {
    #[serde(flatten)]
    pub base: ActionBase,
    pub local: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    pub operation: LocalOperation,
}

#[async_trait]
impl Action for SetRunLocal {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if !LOCAL_NAME.is_match(&self.local) {
            return Err(ReadError::validation(format!(
                "'{}' is not a valid local name",
                self.local
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        match self.operation {
            LocalOperation::Set => {
                let (value, _) = run.evaluate_template(&self.value, log_event);
                let max_chars = run.session().engine().options().max_result_chars;
                run.locals_mut().set(&self.local, truncate_chars(&value, max_chars));
            }
            LocalOperation::Increment => {
                let (value, _) = run.evaluate_template(&self.value, log_event);
                let Ok(increment) = value.trim().parse::<i64>() else {
                    log_event(Event::error("increment value is not an integer"));
                    return Ok(());
                };
                let current = run.locals().get(&self.local).parse::<i64>().unwrap_or(0);
                run.locals_mut()
                    .set(&self.local, current.saturating_add(increment).to_string());
            }
            LocalOperation::Clear => run.locals_mut().clear(&self.local),
        }
        Ok(())
    }

    fn inspect(
        &self,
        _dependency: &mut DependencyCallback<'_>,
        local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        local(&self.local);
    }
}
