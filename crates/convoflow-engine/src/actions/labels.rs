//! Labelling the message that resumed the session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::resolve_labels;
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::ActionError;
use crate::events::{Event, InputLabelsAdded};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{AssetReference, LabelReference};

/// Adds labels to the session's input message. Does nothing if the session
/// has no input.
///
/// ```json
/// {
///   "type": "add_input_labels",
///   "uuid": "...",
///   "labels": [{"uuid": "3f65d88a-95dc-4140-9451-943e94e06fea", "name": "Spam"}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddInputLabels {
    #[serde(flatten)]
    pub base: ActionBase,
    pub labels: Vec<LabelReference>,
}

#[async_trait]
impl Action for AddInputLabels {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let Some(input_uuid) = run.session().input().map(|i| i.uuid) else {
            return Ok(());
        };

        let labels = resolve_labels(run, &self.labels, log_event);
        if !labels.is_empty() {
            log_event(Event::new(InputLabelsAdded {
                input_uuid,
                labels: labels.iter().map(|l| l.reference()).collect(),
            }));
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        for label in &self.labels {
            dependency(AssetReference::Label(label.clone()));
        }
    }
}
