//! Events: the typed, timestamped log of everything that happened in a run.
//!
//! Every event is a JSON object with a `type` discriminator alongside its
//! `uuid`, `created_on` and optional `step_uuid`. Some events are pure audit
//! records; the rest can be replayed with [`Event::apply`] to rebuild run,
//! session and contact state without any I/O.
//!
//! Each event type declares an [`Origin`]. Events the engine produces can't
//! be submitted by callers and vice versa; this is checked when reading.

mod apply;
pub mod contact;
pub mod msgs;
mod registry;
pub mod run;
pub mod services;
pub mod tickets;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use contact::*;
pub use msgs::*;
pub use registry::{read_event, EventRegistry};
pub use run::*;
pub use services::*;
pub use tickets::*;

use crate::types::{truncate_ellipsis, AssetReference, CallStatus, WebhookCall, MAX_TRACE_BYTES};

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// Who may create an event of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Only produced by actions and the engine.
    Engine,
    /// Only submitted by callers, e.g. to resume a session.
    Caller,
    Either,
}

impl Origin {
    /// Whether an event of this origin can be read by `reader`. A reader of
    /// `Either` is replaying a stored log and accepts everything.
    pub fn permits(self, reader: Origin) -> bool {
        self == Origin::Either || reader == Origin::Either || self == reader
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Engine => "engine",
            Self::Caller => "caller",
            Self::Either => "either",
        })
    }
}

/// Static description of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType {
    pub name: &'static str,
    pub origin: Origin,
    /// Whether `apply` changes state.
    pub replayable: bool,
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

macro_rules! event_kinds {
    ($($variant:ident($payload:ty) = $name:literal, $origin:ident, $replayable:literal;)*) => {
        /// The payload of an event, keyed by its `type`.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type")]
        #[non_exhaustive]
        pub enum EventKind {
            $(
                #[serde(rename = $name)]
                $variant($payload),
            )*
        }

        impl EventKind {
            pub fn type_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $name,)*
                }
            }

            pub fn origin(&self) -> Origin {
                match self {
                    $(Self::$variant(_) => Origin::$origin,)*
                }
            }
        }

        $(
            impl From<$payload> for EventKind {
                fn from(payload: $payload) -> Self {
                    Self::$variant(payload)
                }
            }
        )*

        /// Every event type, in declaration order.
        pub const EVENT_TYPES: &[EventType] = &[
            $(EventType { name: $name, origin: Origin::$origin, replayable: $replayable },)*
        ];
    };
}

event_kinds! {
    // contacts
    ContactCreated(ContactCreated) = "contact_created", Engine, false;
    ContactFieldChanged(ContactFieldChanged) = "contact_field_changed", Engine, true;
    ContactGroupsChanged(ContactGroupsChanged) = "contact_groups_changed", Engine, true;
    ContactLanguageChanged(ContactLanguageChanged) = "contact_language_changed", Engine, true;
    ContactLastSeenOnChanged(ContactLastSeenOnChanged) = "contact_last_seen_on_changed", Engine, true;
    ContactNameChanged(ContactNameChanged) = "contact_name_changed", Engine, true;
    ContactRefreshed(ContactRefreshed) = "contact_refreshed", Either, true;
    ContactStatusChanged(ContactStatusChanged) = "contact_status_changed", Engine, true;
    ContactTimezoneChanged(ContactTimezoneChanged) = "contact_timezone_changed", Engine, true;
    ContactUrnsChanged(ContactUrnsChanged) = "contact_urns_changed", Engine, true;

    // tickets
    TicketOpened(TicketOpened) = "ticket_opened", Engine, true;
    TicketClosed(TicketClosed) = "ticket_closed", Engine, true;
    TicketReopened(TicketReopened) = "ticket_reopened", Engine, true;
    TicketAssigneeChanged(TicketAssigneeChanged) = "ticket_assignee_changed", Engine, true;
    TicketTopicChanged(TicketTopicChanged) = "ticket_topic_changed", Engine, true;
    TicketNoteAdded(TicketNoteAdded) = "ticket_note_added", Engine, true;

    // messaging
    BroadcastCreated(BroadcastCreated) = "broadcast_created", Engine, false;
    ChatStarted(ChatStarted) = "chat_started", Caller, false;
    InputLabelsAdded(InputLabelsAdded) = "input_labels_added", Engine, true;
    MsgCreated(MsgCreated) = "msg_created", Engine, false;
    MsgReceived(MsgReceived) = "msg_received", Caller, false;
    MsgWait(MsgWait) = "msg_wait", Engine, false;
    OptInRequested(OptInRequested) = "optin_requested", Engine, false;
    OptInStarted(OptInStarted) = "optin_started", Caller, false;
    OptInStopped(OptInStopped) = "optin_stopped", Caller, false;
    WaitExpired(WaitExpired) = "wait_expired", Caller, false;
    WaitTimedOut(WaitTimedOut) = "wait_timed_out", Caller, false;

    // voice
    CallCreated(CallCreated) = "call_created", Engine, false;
    CallMissed(CallMissed) = "call_missed", Caller, false;
    CallReceived(CallReceived) = "call_received", Caller, false;
    DialEnded(DialEnded) = "dial_ended", Caller, false;
    DialWait(DialWait) = "dial_wait", Engine, false;
    IvrCreated(IvrCreated) = "ivr_created", Engine, false;

    // services
    AirtimeTransferred(AirtimeTransferred) = "airtime_transferred", Engine, false;
    ClassifierCalled(ClassifierCalled) = "classifier_called", Engine, false;
    EmailSent(EmailSent) = "email_sent", Engine, false;
    LlmCalled(LlmCalled) = "llm_called", Engine, false;
    ResthookCalled(ResthookCalled) = "resthook_called", Engine, false;
    ServiceCalled(ServiceCalled) = "service_called", Engine, false;
    SessionTriggered(SessionTriggered) = "session_triggered", Engine, false;
    WebhookCalled(WebhookCalled) = "webhook_called", Engine, true;

    // runs
    EnvironmentRefreshed(EnvironmentRefreshed) = "environment_refreshed", Either, true;
    Error(ErrorEvent) = "error", Engine, false;
    Failure(FailureEvent) = "failure", Engine, false;
    FlowEntered(FlowEntered) = "flow_entered", Engine, true;
    Info(InfoEvent) = "info", Engine, false;
    RunEnded(RunEnded) = "run_ended", Engine, true;
    RunExpired(RunExpired) = "run_expired", Caller, false;
    RunResultChanged(RunResultChanged) = "run_result_changed", Engine, true;
    RunResumed(RunResumed) = "run_resumed", Caller, false;
    RunStarted(RunStarted) = "run_started", Engine, false;
    Warning(WarningEvent) = "warning", Engine, false;
}

impl EventKind {
    pub fn is_replayable(&self) -> bool {
        let name = self.type_name();
        EVENT_TYPES.iter().any(|t| t.name == name && t.replayable)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_uuid: Option<Uuid>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: impl Into<EventKind>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            created_on: Utc::now(),
            step_uuid: None,
            kind: kind.into(),
        }
    }

    /// Attaches the step the event was logged during.
    pub fn with_step(mut self, step_uuid: Uuid) -> Self {
        self.step_uuid = Some(step_uuid);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn origin(&self) -> Origin {
        self.kind.origin()
    }

    /// A non-fatal error the flow carries on from.
    pub fn error(text: impl fmt::Display) -> Self {
        Self::new(ErrorEvent {
            text: text.to_string(),
            fatal: false,
        })
    }

    /// An error which ends the run.
    pub fn fatal(text: impl fmt::Display) -> Self {
        Self::new(ErrorEvent {
            text: text.to_string(),
            fatal: true,
        })
    }

    /// An error for a reference to an asset that no longer exists.
    pub fn dependency_error(reference: &AssetReference) -> Self {
        Self::error(format!("missing dependency: {reference}"))
    }

    pub fn failure(text: impl fmt::Display) -> Self {
        Self::new(FailureEvent {
            text: text.to_string(),
        })
    }

    /// Records a webhook call. Traces are cleaned of NULs and invalid
    /// UTF-8 and truncated.
    pub fn webhook_called(call: &WebhookCall, status: CallStatus, resthook: &str) -> Self {
        Self::new(WebhookCalled {
            url: call.url.clone(),
            status,
            status_code: call.response_status,
            elapsed_ms: call.elapsed_ms,
            retries: call.retries,
            request: truncate_ellipsis(&clean_trace(call.request_trace.as_bytes()), MAX_TRACE_BYTES),
            response: truncate_ellipsis(&clean_trace(&call.response()), MAX_TRACE_BYTES),
            extraction: extraction(&call.response_body),
            resthook: resthook.to_string(),
        })
    }

    /// Whether this is an error event marked fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(&self.kind, EventKind::Error(e) if e.fatal)
    }
}

/// Lossy UTF-8 with NUL characters removed.
fn clean_trace(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\0', "")
}

/// Decides how a response body can be used as JSON.
pub(crate) fn extraction(body: &[u8]) -> Extraction {
    if body.is_empty() {
        return Extraction::None;
    }
    if serde_json::from_slice::<serde_json::Value>(body).is_ok() {
        return Extraction::Valid;
    }
    let cleaned = clean_trace(body).replace("\\u0000", "");
    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        Extraction::Cleaned
    } else {
        Extraction::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldReference;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn test_type_names_unique() {
        let names: BTreeSet<_> = EVENT_TYPES.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), EVENT_TYPES.len());
    }

    #[test]
    fn test_event_json() {
        let mut event = Event::new(ContactNameChanged {
            name: "Bob".into(),
        });
        event.uuid = Uuid::parse_str("0197b335-6ded-79a4-95a6-3af85b57f108").unwrap();
        event.created_on = "2018-10-18T14:20:30.000123456Z".parse().unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "uuid": "0197b335-6ded-79a4-95a6-3af85b57f108",
                "type": "contact_name_changed",
                "created_on": "2018-10-18T14:20:30.000123456Z",
                "name": "Bob"
            })
        );
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_dependency_error() {
        let event = Event::dependency_error(&FieldReference::new("age", "Age").into());
        assert_eq!(event.type_name(), "error");
        match &event.kind {
            EventKind::Error(e) => {
                assert_eq!(e.text, "missing dependency: field[key=age,name=Age]");
                assert!(!e.fatal);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(Event::fatal("boom").is_fatal());
    }

    #[test]
    fn test_webhook_called_truncates_and_extracts() {
        let call = WebhookCall {
            url: "http://temba.io/".into(),
            method: "POST".into(),
            request_trace: format!("POST / HTTP/1.1\r\n\r\n{}", "X".repeat(20000)),
            response_trace: "HTTP/1.0 200 OK\r\n\r\n".into(),
            response_status: Some(200),
            response_body: b"{\"ok\": true, \"bad\": \"\\u0000\"}\0".to_vec(),
            elapsed_ms: 12,
            retries: 0,
        };
        let event = Event::webhook_called(&call, CallStatus::Success, "");
        let EventKind::WebhookCalled(called) = &event.kind else {
            panic!("expected webhook_called");
        };
        assert_eq!(called.request.len(), MAX_TRACE_BYTES);
        assert!(called.request.ends_with("..."));
        assert!(!called.response.contains('\0'));
        assert_eq!(called.extraction, Extraction::Cleaned);
        assert_eq!(called.status_code, Some(200));

        assert_eq!(extraction(b""), Extraction::None);
        assert_eq!(extraction(b"[1, 2]"), Extraction::Valid);
        assert_eq!(extraction(b"<html>"), Extraction::Ignored);
    }

    #[test]
    fn test_origins() {
        assert!(Origin::Either.permits(Origin::Caller));
        assert!(Origin::Engine.permits(Origin::Engine));
        assert!(!Origin::Engine.permits(Origin::Caller));
        assert!(!Origin::Caller.permits(Origin::Engine));
        assert!(Origin::Caller.permits(Origin::Either));
        assert_eq!(Origin::Caller.to_string(), "caller");
    }
}
