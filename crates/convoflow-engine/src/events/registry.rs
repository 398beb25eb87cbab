//! Reading events from JSON.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde_json::Value;

use super::{Event, EventType, Origin, EVENT_TYPES};
use crate::errors::ReadError;

/// Lookup table of event types, built once.
#[derive(Debug)]
pub struct EventRegistry {
    types: BTreeMap<&'static str, EventType>,
}

static STANDARD: LazyLock<EventRegistry> = LazyLock::new(|| EventRegistry {
    types: EVENT_TYPES.iter().map(|t| (t.name, *t)).collect(),
});

impl EventRegistry {
    pub fn standard() -> &'static EventRegistry {
        &STANDARD
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<&EventType> {
        self.types.get(name)
    }

    /// Reads an event, rejecting types that `reader` isn't allowed to create.
    pub fn read(&self, data: &Value, reader: Origin) -> Result<Event, ReadError> {
        let type_name = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ReadError::MissingType)?;

        let info = self.get(type_name).ok_or_else(|| ReadError::UnknownType {
            name: type_name.to_string(),
        })?;

        if !info.origin.permits(reader) {
            return Err(ReadError::Origin {
                event_type: type_name.to_string(),
                origin: reader.to_string(),
            });
        }

        serde_json::from_value(data.clone()).map_err(|e| {
            tracing::debug!(event_type = type_name, error = %e, "unable to decode event");
            ReadError::decode(type_name, e)
        })
    }
}

/// Reads an event using the standard registry.
pub fn read_event(data: &Value, reader: Origin) -> Result<Event, ReadError> {
    EventRegistry::standard().read(data, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    #[test]
    fn test_read_errors() {
        let err = read_event(&json!({"name": "Bob"}), Origin::Engine).unwrap_err();
        assert_eq!(err, ReadError::MissingType);
        assert_eq!(err.to_string(), "field 'type' is required");

        let err = read_event(&json!({"type": "x_happened"}), Origin::Engine).unwrap_err();
        assert_eq!(err.to_string(), "unknown type: 'x_happened'");

        let err = read_event(&json!({"type": "contact_name_changed"}), Origin::Engine).unwrap_err();
        assert!(matches!(err, ReadError::Decode { .. }));

        // events without a timestamp can't be ordered for replay
        let err = read_event(
            &json!({"type": "contact_name_changed", "name": "Bob"}),
            Origin::Engine,
        )
        .unwrap_err();
        assert!(matches!(err, ReadError::Decode { .. }));
        assert!(err.to_string().contains("created_on"), "{err}");
    }

    #[test]
    fn test_origin_enforced() {
        let received = json!({
            "type": "msg_received",
            "created_on": "2018-10-18T14:20:30.000123456Z",
            "msg": {
                "uuid": "2d611e17-fb22-457f-b802-b8f7ec5cda5b",
                "urn": "tel:+12065551212",
                "text": "hi there"
            }
        });
        let err = read_event(&received, Origin::Engine).unwrap_err();
        assert_eq!(
            err.to_string(),
            "event type 'msg_received' cannot be created by engine"
        );
        assert!(read_event(&received, Origin::Caller).is_ok());
        assert!(read_event(&received, Origin::Either).is_ok());

        let name_changed = json!({
            "type": "contact_name_changed",
            "created_on": "2018-10-18T14:20:30.000123456Z",
            "name": "Bob"
        });
        assert!(read_event(&name_changed, Origin::Caller).is_err());

        let refreshed = json!({
            "type": "environment_refreshed",
            "created_on": "2018-10-18T14:20:30.000123456Z",
            "environment": {"date_format": "YYYY-MM-DD", "time_format": "hh:mm", "timezone": "Africa/Kigali"}
        });
        assert!(read_event(&refreshed, Origin::Caller).is_ok());
        assert!(read_event(&refreshed, Origin::Engine).is_ok());
    }

    #[test]
    fn test_deprecated_classifier_called_round_trips() {
        let data = json!({
            "uuid": "0197b335-6ded-79a4-95a6-3af85b57f108",
            "type": "classifier_called",
            "created_on": "2006-01-02T15:04:05Z",
            "classifier": {"uuid": "1c06c884-39dd-4ce4-ad9f-9a01cbe6c000", "name": "Booking"},
            "http_logs": [{
                "url": "https://api.wit.ai/message?v=20200513&q=book+flight",
                "status_code": 200,
                "status": "success",
                "request": "GET /message?v=20200513&q=book+flight HTTP/1.1\r\nHost: api.wit.ai\r\n\r\n",
                "response": "HTTP/1.1 200 OK\r\n\r\n{\"intents\":[]}",
                "elapsed_ms": 12,
                "retries": 0,
                "created_on": "2006-01-02T15:04:05Z"
            }]
        });
        let event = read_event(&data, Origin::Engine).unwrap();
        assert!(matches!(event.kind, EventKind::ClassifierCalled(_)));
        assert_eq!(event.type_name(), "classifier_called");
        assert_eq!(serde_json::to_value(&event).unwrap(), data);
    }

    /// Wraps a payload in the fields every event has.
    fn event(type_name: &str, payload: Value) -> Value {
        let mut data = json!({
            "uuid": "0197b335-6ded-79a4-95a6-3af85b57f108",
            "type": type_name,
            "created_on": "2006-01-02T15:04:05Z",
            "step_uuid": "3a3e8a5c-7e39-4c7c-9c9d-4e2ab1b0f3a1"
        });
        if let (Some(data), Value::Object(payload)) = (data.as_object_mut(), payload) {
            data.extend(payload);
        }
        data
    }

    #[test]
    fn test_fixture_shapes() {
        let nexmo = json!({"uuid": "57f1078f-88aa-46f4-a59a-948a5739c03d", "name": "Nexmo"});
        let testers = json!({"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"});
        let flow = json!({"uuid": "50c3706e-fbfd-4f2b-a1a4-4eb2c1f7bf3e", "name": "Registration"});
        let optin = json!({"uuid": "248be71d-78e9-4d71-a6c4-9981d369e5cb", "name": "Joke Of The Day"});
        let general = json!({"uuid": "0d9a2c56-6fc2-4f27-93c5-a6322e26b740", "name": "General"});
        let bob = json!({"email": "bob@nyaruka.com", "name": "Bob"});
        let ticket_uuid = "7481888c-07dd-47dc-bf22-ef7448696ffe";
        let run_uuid = "4213ac47-93fd-48c4-af12-7da8218ef09d";
        let contact = json!({
            "uuid": "5d76d86b-3bb9-4d5a-b822-c9d86f5d8e4f",
            "id": 1234567,
            "name": "Ryan Lewis",
            "language": "eng",
            "timezone": "America/Guayaquil",
            "status": "active",
            "created_on": "2018-06-20T11:40:30.123456789Z",
            "last_seen_on": "2018-10-18T14:20:30Z",
            "urns": ["tel:+12065551212"],
            "groups": [testers],
            "fields": {"age": {"text": "23", "number": 23}},
            "tickets": [{"uuid": ticket_uuid, "status": "open", "topic": general, "assignee": bob}]
        });
        let call = json!({
            "uuid": "0198ab4f-8b6c-4b1e-9d3a-6a4e2f5c7d10",
            "channel": nexmo,
            "urn": "tel:+12065551212"
        });
        let http_log = json!({
            "url": "https://api.openai.com/v1/chat/completions",
            "status_code": 200,
            "status": "success",
            "request": "POST /v1/chat/completions HTTP/1.1\r\nHost: api.openai.com\r\n\r\n{}",
            "response": "HTTP/1.1 200 OK\r\n\r\n{}",
            "elapsed_ms": 1200,
            "retries": 0,
            "created_on": "2006-01-02T15:04:05Z"
        });

        let fixtures = [
            event("airtime_transferred", json!({
                "transfer_uuid": "552cd7ee-ccba-404d-9692-c1fe3b8d57c5",
                "external_id": "12345678",
                "sender": "tel:4748",
                "recipient": "tel:+1242563637",
                "currency": "RWF",
                "amount": 100,
                "http_logs": []
            })),
            event("broadcast_created", json!({
                "translations": {
                    "eng": {"text": "Hello", "quick_replies": [{"text": "Yes"}]},
                    "fra": {"text": "Bonjour", "attachments": ["image/jpeg:http://example.com/a.jpg"]}
                },
                "base_language": "eng",
                "groups": [testers],
                "contacts": [{"uuid": "1e1ce1e1-9288-4504-869e-022d1003c72a", "name": "Bob"}],
                "contact_query": "age > 10",
                "urns": ["tel:+12065551212"]
            })),
            event("call_created", json!({"call": call})),
            event("call_missed", json!({"channel": nexmo})),
            event("call_received", json!({"call": call})),
            event("chat_started", json!({"channel": nexmo, "params": {"referrer_id": "acme"}})),
            event("classifier_called", json!({
                "classifier": {"uuid": "1c06c884-39dd-4ce4-ad9f-9a01cbe6c000", "name": "Booking"},
                "http_logs": [http_log]
            })),
            event("contact_created", json!({"contact": contact})),
            event("contact_field_changed", json!({
                "field": {"key": "gender", "name": "Gender"},
                "value": null
            })),
            event("contact_groups_changed", json!({
                "groups_added": [testers],
                "groups_removed": [{"uuid": "4f1f98fc-27a7-4a69-bbdb-24744ba739a9", "name": "Males"}]
            })),
            event("contact_language_changed", json!({"language": "fra"})),
            event("contact_last_seen_on_changed", json!({"last_seen_on": "2022-01-31T15:36:30Z"})),
            event("contact_name_changed", json!({"name": "Bob"})),
            event("contact_refreshed", json!({"contact": contact})),
            event("contact_status_changed", json!({"status": "stopped"})),
            event("contact_timezone_changed", json!({"timezone": "Africa/Kigali"})),
            event("contact_urns_changed", json!({"urns": ["tel:+12065551212", "twitter:bob"]})),
            event("dial_ended", json!({"dial": {"status": "busy", "duration": 0}})),
            event("dial_wait", json!({
                "urn": "tel:+12065551212",
                "dial_limit_seconds": 60,
                "call_limit_seconds": 7200,
                "expires_on": "2022-02-02T13:27:30Z"
            })),
            event("email_sent", json!({
                "to": ["foo@bar.com"],
                "subject": "Hi there",
                "body": "So I was thinking..."
            })),
            event("environment_refreshed", json!({
                "environment": {
                    "date_format": "YYYY-MM-DD",
                    "time_format": "hh:mm",
                    "timezone": "Africa/Kigali",
                    "allowed_languages": ["eng", "fra"],
                    "default_country": "RW",
                    "number_format": {"decimal_symbol": ",", "digit_grouping_symbol": "."},
                    "redaction_policy": "urns",
                    "input_collation": "default"
                }
            })),
            event("error", json!({"text": "I'm an error", "fatal": true})),
            event("failure", json!({"text": "flow loop detected"})),
            event("flow_entered", json!({"flow": flow, "parent_run_uuid": run_uuid, "terminal": false})),
            event("info", json!({"text": "an informational message"})),
            event("input_labels_added", json!({
                "input_uuid": "9bf91c2b-ce58-4cef-aacc-281e03f69ab5",
                "labels": [{"uuid": "3f65d88a-95dc-4140-9451-943e94e06fea", "name": "Spam"}]
            })),
            event("ivr_created", json!({
                "msg": {
                    "uuid": "2d611e17-fb22-457f-b802-b8f7ec5cda5b",
                    "urn": "tel:+12065551212",
                    "channel": nexmo,
                    "text": "Hi there",
                    "attachments": ["audio:http://example.com/hi.m4a"],
                    "locale": "eng-US"
                }
            })),
            event("llm_called", json!({
                "llm": {"uuid": "14115c03-b4c5-49e2-b9ac-390c43e9d7ce", "name": "GPT"},
                "instructions": "Translate to French",
                "input": "Hello",
                "output": "Bonjour",
                "tokens_used": 567,
                "elapsed_ms": 1234
            })),
            event("msg_created", json!({
                "msg": {
                    "uuid": "2d611e17-fb22-457f-b802-b8f7ec5cda5b",
                    "urn": "tel:+12065551212",
                    "channel": nexmo,
                    "text": "Hi Bob",
                    "quick_replies": [{"text": "Stop", "extra": "unsubscribe"}],
                    "templating": {
                        "template": {"uuid": "9c22b594-fcab-4b29-9bcb-ce4404894a80", "name": "greeting"},
                        "namespace": "0162a7f4_dfe4_4c96_be07_854d5dba3b2b",
                        "components": [{"type": "body", "name": "body", "variables": {"1": 0}}],
                        "variables": [{"type": "text", "value": "Bob"}]
                    },
                    "topic": "account",
                    "locale": "eng-RW",
                    "unsendable_reason": "contact_stopped"
                }
            })),
            event("msg_received", json!({
                "msg": {
                    "uuid": "2d611e17-fb22-457f-b802-b8f7ec5cda5b",
                    "urn": "tel:+12065551212",
                    "channel": nexmo,
                    "text": "",
                    "attachments": ["image/jpeg:http://example.com/a.jpg"]
                }
            })),
            event("msg_wait", json!({
                "timeout_seconds": 300,
                "expires_on": "2022-02-02T13:27:30Z",
                "hint": {"type": "digits", "count": 4, "terminated_by": "#"}
            })),
            event("optin_requested", json!({"optin": optin, "channel": nexmo, "urn": "facebook:1234567890"})),
            event("optin_started", json!({"optin": optin})),
            event("optin_stopped", json!({"optin": optin})),
            event("resthook_called", json!({
                "resthook": "new-registration",
                "payload": {"contact": {"uuid": "5d76d86b-3bb9-4d5a-b822-c9d86f5d8e4f"}}
            })),
            event("run_ended", json!({"run_uuid": run_uuid, "flow": flow, "status": "completed"})),
            event("run_expired", json!({"run_uuid": run_uuid})),
            event("run_result_changed", json!({
                "name": "Gender",
                "value": "m",
                "category": "Male",
                "category_localized": "Homme",
                "node_uuid": "c0781400-737f-4940-9a6c-1ec1c3df0325",
                "input": "M",
                "extra": {"source": "keyword"},
                "previous_value": "f"
            })),
            event("run_resumed", json!({})),
            event("run_started", json!({"run_uuid": run_uuid, "flow": flow})),
            event("service_called", json!({
                "service": "llm",
                "llm": {"uuid": "14115c03-b4c5-49e2-b9ac-390c43e9d7ce", "name": "GPT"},
                "http_logs": [http_log]
            })),
            event("session_triggered", json!({
                "flow": flow,
                "groups": [testers],
                "contact_query": "age > 10",
                "create_contact": true,
                "urns": ["tel:+12065551212"],
                "exclusions": {"in_a_flow": true},
                "interrupt": true,
                "run_summary": {"uuid": run_uuid, "status": "active"},
                "history": {
                    "parent_uuid": "418a704c-f33e-4924-a00e-1763d1498a13",
                    "ancestors": 2,
                    "ancestors_since_input": 1
                }
            })),
            event("ticket_assignee_changed", json!({"ticket_uuid": ticket_uuid, "assignee": bob})),
            event("ticket_closed", json!({"ticket_uuid": ticket_uuid})),
            event("ticket_note_added", json!({"ticket_uuid": ticket_uuid, "note": "call back"})),
            event("ticket_opened", json!({
                "ticket": {"uuid": ticket_uuid, "topic": general, "assignee": bob},
                "note": "this is a note"
            })),
            event("ticket_reopened", json!({"ticket_uuid": ticket_uuid})),
            event("ticket_topic_changed", json!({"ticket_uuid": ticket_uuid, "topic": general})),
            event("wait_expired", json!({})),
            event("wait_timed_out", json!({})),
            event("warning", json!({"text": "deprecated context value accessed"})),
            event("webhook_called", json!({
                "url": "http://localhost:49998/?cmd=success",
                "status": "success",
                "status_code": 200,
                "elapsed_ms": 0,
                "retries": 0,
                "request": "GET /?cmd=success HTTP/1.1\r\nHost: localhost:49998\r\n\r\n",
                "response": "HTTP/1.1 200 OK\r\n\r\n{\"ok\": \"true\"}",
                "extraction": "valid",
                "resthook": "new-registration"
            })),
        ];

        let covered: Vec<&str> = fixtures.iter().filter_map(|f| f["type"].as_str()).collect();
        for event_type in EVENT_TYPES {
            assert!(
                covered.contains(&event_type.name),
                "no fixture for event type '{}'",
                event_type.name
            );
        }

        for fixture in fixtures {
            let event = read_event(&fixture, Origin::Either)
                .unwrap_or_else(|e| panic!("{}: {e}", fixture["type"]));
            assert_eq!(serde_json::to_value(&event).unwrap(), fixture);
        }
    }
}
