//! Replaying events against a run.

use chrono_tz::Tz;

use super::{Event, EventKind, WebhookCalled};
use crate::errors::ApplyError;
use crate::missing::MissingCallback;
use crate::run::Run;
use crate::types::{AssetReference, Contact, RunResult, Ticket, TicketStatus, WebhookCall};

impl Event {
    /// Applies the event's changes to the run, its session and contact.
    /// Audit-only events are accepted and change nothing. Assets which no
    /// longer exist are reported to `missing` and skipped.
    pub fn apply(
        &self,
        run: &mut dyn Run,
        missing: &mut MissingCallback<'_>,
    ) -> Result<(), ApplyError> {
        match &self.kind {
            EventKind::ContactNameChanged(e) => {
                self.contact(run)?.set_name(e.name.clone());
            }
            EventKind::ContactLanguageChanged(e) => {
                let language = Some(e.language.clone()).filter(|l| !l.is_empty());
                self.contact(run)?.set_language(language);
            }
            EventKind::ContactTimezoneChanged(e) => {
                let timezone = match e.timezone.as_str() {
                    "" => None,
                    name => Some(name.parse::<Tz>().map_err(|_| {
                        self.invalid(format!("unrecognized timezone: '{name}'"))
                    })?),
                };
                self.contact(run)?.set_timezone(timezone);
            }
            EventKind::ContactStatusChanged(e) => {
                self.contact(run)?.set_status(e.status);
            }
            EventKind::ContactLastSeenOnChanged(e) => {
                self.contact(run)?.set_last_seen_on(e.last_seen_on);
            }
            EventKind::ContactFieldChanged(e) => {
                self.contact(run)?.set_field_value(&e.field.key, e.value.clone());
            }
            EventKind::ContactUrnsChanged(e) => {
                self.contact(run)?.set_urns(e.urns.clone());
            }
            EventKind::ContactGroupsChanged(e) => {
                let assets = run.session().assets().clone();
                let contact = self.contact(run)?;
                for reference in &e.groups_added {
                    match reference.uuid().and_then(|u| assets.groups().get(u)) {
                        Some(group) => {
                            contact.groups_mut().add(group);
                        }
                        None => missing(AssetReference::Group(reference.clone()), None),
                    }
                }
                for uuid in e.groups_removed.iter().filter_map(|r| r.uuid()) {
                    contact.groups_mut().remove(uuid);
                }
            }
            EventKind::ContactRefreshed(e) => {
                let assets = run.session().assets().clone();
                let contact = Contact::from_envelope(&assets, e.contact.clone(), missing)
                    .map_err(|err| self.invalid(err.to_string()))?;
                run.session_mut().set_contact(contact);
            }

            EventKind::TicketOpened(e) => {
                let mut ticket = Ticket::new(
                    e.ticket.uuid,
                    e.ticket.topic.clone(),
                    e.ticket.assignee.clone(),
                );
                if !e.note.is_empty() {
                    ticket.last_note = Some(e.note.clone());
                }
                self.contact(run)?.tickets_mut().add(ticket);
            }
            EventKind::TicketClosed(e) => {
                if let Some(ticket) = self.contact(run)?.tickets_mut().get_mut(e.ticket_uuid) {
                    ticket.status = TicketStatus::Closed;
                }
            }
            EventKind::TicketReopened(e) => {
                if let Some(ticket) = self.contact(run)?.tickets_mut().get_mut(e.ticket_uuid) {
                    ticket.status = TicketStatus::Open;
                }
            }
            EventKind::TicketAssigneeChanged(e) => {
                if let Some(ticket) = self.contact(run)?.tickets_mut().get_mut(e.ticket_uuid) {
                    ticket.assignee = e.assignee.clone();
                }
            }
            EventKind::TicketTopicChanged(e) => {
                if let Some(ticket) = self.contact(run)?.tickets_mut().get_mut(e.ticket_uuid) {
                    ticket.topic = Some(e.topic.clone());
                }
            }
            EventKind::TicketNoteAdded(e) => {
                if let Some(ticket) = self.contact(run)?.tickets_mut().get_mut(e.ticket_uuid) {
                    ticket.last_note = Some(e.note.clone());
                }
            }

            EventKind::RunResultChanged(e) => {
                run.set_result(RunResult {
                    name: e.name.clone(),
                    value: e.value.clone(),
                    category: e.category.clone(),
                    category_localized: e.category_localized.clone(),
                    node_uuid: e.node_uuid,
                    input: e.input.clone(),
                    extra: e.extra.clone(),
                    created_on: self.created_on,
                });
            }
            EventKind::EnvironmentRefreshed(e) => {
                run.session_mut().set_environment(e.environment.clone());
            }
            EventKind::WebhookCalled(e) => {
                run.set_webhook(Some(rebuild_call(e)));
            }
            EventKind::FlowEntered(e) => {
                let flow = run.session().assets().flows().get(e.flow.uuid);
                match flow {
                    Some(flow) => run.session_mut().push_flow(flow, e.parent_run_uuid, e.terminal),
                    None => missing(AssetReference::Flow(e.flow.clone()), None),
                }
            }
            EventKind::RunEnded(e) => {
                if e.run_uuid == run.uuid() && !run.status().is_ended() {
                    run.exit(e.status);
                }
            }
            // labels live on the input message, which the caller owns
            EventKind::InputLabelsAdded(_) => {}

            _ => {}
        }
        Ok(())
    }

    fn contact<'r>(&self, run: &'r mut dyn Run) -> Result<&'r mut Contact, ApplyError> {
        run.contact_mut()
            .ok_or_else(|| self.invalid("session has no contact".to_string()))
    }

    fn invalid(&self, message: String) -> ApplyError {
        ApplyError::Invalid {
            event_type: self.type_name().to_string(),
            message,
        }
    }
}

/// Rebuilds enough of a webhook call from its event for `@webhook` to work.
fn rebuild_call(event: &WebhookCalled) -> WebhookCall {
    let (response_trace, body) = match event.response.split_once("\r\n\r\n") {
        Some((head, body)) => (format!("{head}\r\n\r\n"), body.as_bytes().to_vec()),
        None => (event.response.clone(), Vec::new()),
    };
    let method = event
        .request
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    WebhookCall {
        url: event.url.clone(),
        method,
        request_trace: event.request.clone(),
        response_trace,
        response_status: event.status_code,
        response_body: body,
        elapsed_ms: event.elapsed_ms,
        retries: event.retries,
    }
}
