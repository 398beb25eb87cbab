//! Opening tickets for human agents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base::{
    apply_modifier, evaluate_trimmed, resolve_user, save_result, validate_result_name,
};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::Event;
use crate::modifiers::Modifier;
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{
    AssetReference, ResultInfo, TopicReference, UserReference, CATEGORY_FAILURE, CATEGORY_SUCCESS,
};

/// Local set to the UUID of the opened ticket, or empty.
pub const NEW_TICKET_LOCAL: &str = "_new_ticket";

/// Topic used when the action doesn't name one.
const DEFAULT_TOPIC: &str = "General";

/// Opens a ticket for the contact unless they already have an open one.
///
/// ```json
/// {
///   "type": "open_ticket",
///   "uuid": "...",
///   "topic": {"uuid": "472a7a73-96cb-4736-b567-056d987cc5b4", "name": "Weather"},
///   "note": "@input.text",
///   "assignee": {"email": "bob@nyaruka.com", "name": "Bob"},
///   "result_name": "Ticket"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTicket {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_name: String,
}

impl OpenTicket {
    /// Opens the ticket, returning its UUID if one was opened.
    fn open(
        &self,
        run: &mut dyn Run,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Option<Uuid> {
        if run.session().batch_start() {
            log_event(Event::error("can't open tickets during batch starts"));
            return None;
        }

        let topics = run.session().assets().topics();
        let topic = match &self.topic {
            Some(reference) => {
                let topic = topics.get(reference.uuid);
                if topic.is_none() {
                    log_event(Event::dependency_error(&AssetReference::Topic(
                        reference.clone(),
                    )));
                }
                topic?
            }
            None => {
                let topic = topics.find_by_name(DEFAULT_TOPIC);
                if topic.is_none() {
                    log_event(Event::error(format!(
                        "no topic named '{DEFAULT_TOPIC}' to open ticket with"
                    )));
                }
                topic?
            }
        };

        let assignee = self
            .assignee
            .as_ref()
            .and_then(|a| resolve_user(run, a, log_event));
        let note = evaluate_trimmed(run, &self.note, log_event);

        let ticket_uuid = Uuid::new_v4();
        let modifier = Modifier::TicketOpen {
            ticket_uuid,
            topic,
            assignee,
            note,
        };
        apply_modifier(run, modifier, log_modifier, log_event).then_some(ticket_uuid)
    }
}

#[async_trait]
impl Action for OpenTicket {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        validate_result_name(&self.result_name)
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }

        let ticket = self.open(run, log_modifier, log_event);
        let value = ticket.map(|uuid| uuid.to_string()).unwrap_or_default();
        run.locals_mut().set(NEW_TICKET_LOCAL, value.clone());

        if !self.result_name.is_empty() {
            let category = if ticket.is_some() {
                CATEGORY_SUCCESS
            } else {
                CATEGORY_FAILURE
            };
            save_result(run, step, &self.result_name, &value, category, "", None, None, log_event);
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        if let Some(topic) = &self.topic {
            dependency(AssetReference::Topic(topic.clone()));
        }
        if let Some(assignee) = &self.assignee {
            dependency(AssetReference::User(assignee.clone()));
        }
        local(NEW_TICKET_LOCAL);
        if !self.result_name.is_empty() {
            result(ResultInfo::new(
                &self.result_name,
                &[CATEGORY_SUCCESS, CATEGORY_FAILURE],
            ));
        }
    }
}
