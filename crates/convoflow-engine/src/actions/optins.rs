//! Requesting opt-ins from the contact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::ActionError;
use crate::events::{Event, OptInRequested};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{AssetReference, OptInReference};

/// Channel feature required to send opt-in requests.
const FEATURE_OPTINS: &str = "optins";

/// Asks the contact to opt in, if their preferred channel supports it.
///
/// ```json
/// {
///   "type": "request_optin",
///   "uuid": "...",
///   "optin": {"uuid": "248be71d-78e9-4d71-a6c4-9981d369e5cb", "name": "Joke Of The Day"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptIn {
    #[serde(flatten)]
    pub base: ActionBase,
    pub optin: OptInReference,
}

#[async_trait]
impl Action for RequestOptIn {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let assets = run.session().assets();
        let Some(optin) = assets.optins().get(self.optin.uuid) else {
            log_event(Event::dependency_error(&AssetReference::OptIn(
                self.optin.clone(),
            )));
            return Ok(());
        };
        let Some(contact) = run.contact() else {
            return Ok(());
        };

        let destination = contact
            .resolve_destinations(assets, false)
            .into_iter()
            .next()
            .filter(|d| d.channel.has_feature(FEATURE_OPTINS));

        if let Some(dest) = destination {
            log_event(Event::new(OptInRequested {
                optin: optin.reference(),
                channel: dest.channel.reference(),
                urn: dest.urn,
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
        dependency(AssetReference::OptIn(self.optin.clone()));
    }
}
