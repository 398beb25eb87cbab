//! The table of action types and reading actions from JSON.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::contact::{
    AddContactUrn, SetContactChannel, SetContactField, SetContactLanguage, SetContactName,
    SetContactStatus, SetContactTimezone, UpdateContact,
};
use super::flows::{EnterFlow, StartSession, TriggerSession};
use super::groups::{AddContactGroups, AddToGroup, RemoveContactGroups, RemoveFromGroup};
use super::labels::AddInputLabels;
use super::messaging::{SendBroadcast, SendMsg};
use super::optins::RequestOptIn;
use super::results::{SetRunLocal, SetRunResult};
use super::services::{CallClassifier, CallLlm, SendEmail, TransferAirtime};
use super::tickets::OpenTicket;
use super::voice::{ForwardIvr, PlayAudio, PlayMsg, SayMsg};
use super::webhook::{CallResthook, CallWebhook};
use super::Action;
use crate::errors::ReadError;

type Decoder = fn(&Value) -> Result<Box<dyn Action>, serde_json::Error>;

fn decode<T: Action + DeserializeOwned + 'static>(
    data: &Value,
) -> Result<Box<dyn Action>, serde_json::Error> {
    Ok(Box::new(T::deserialize(data)?))
}

macro_rules! action_types {
    ($($name:literal => $ty:ty),* $(,)?) => {
        /// Every action type name, sorted.
        pub const ACTION_TYPES: &[&str] = &[$($name),*];

        fn decoders() -> BTreeMap<&'static str, Decoder> {
            BTreeMap::from([$(($name, decode::<$ty> as Decoder)),*])
        }
    };
}

action_types! {
    "add_contact_groups" => AddContactGroups,
    "add_contact_urn" => AddContactUrn,
    "add_input_labels" => AddInputLabels,
    "add_to_group" => AddToGroup,
    "call_classifier" => CallClassifier,
    "call_llm" => CallLlm,
    "call_resthook" => CallResthook,
    "call_webhook" => CallWebhook,
    "enter_flow" => EnterFlow,
    "forward_ivr" => ForwardIvr,
    "open_ticket" => OpenTicket,
    "play_audio" => PlayAudio,
    "play_msg" => PlayMsg,
    "remove_contact_groups" => RemoveContactGroups,
    "remove_from_group" => RemoveFromGroup,
    "reply" => SendMsg,
    "request_optin" => RequestOptIn,
    "say_msg" => SayMsg,
    "send_broadcast" => SendBroadcast,
    "send_email" => SendEmail,
    "send_msg" => SendMsg,
    "send_optin" => RequestOptIn,
    "set_contact_channel" => SetContactChannel,
    "set_contact_field" => SetContactField,
    "set_contact_language" => SetContactLanguage,
    "set_contact_name" => SetContactName,
    "set_contact_status" => SetContactStatus,
    "set_contact_timezone" => SetContactTimezone,
    "set_run_local" => SetRunLocal,
    "set_run_result" => SetRunResult,
    "start_flow" => EnterFlow,
    "start_session" => StartSession,
    "transfer_airtime" => TransferAirtime,
    "trigger_session" => TriggerSession,
    "update_contact" => UpdateContact,
}

/// Maps type names to decoders. Built once; read-only after that.
pub struct ActionRegistry {
    decoders: BTreeMap<&'static str, Decoder>,
}

static STANDARD: LazyLock<ActionRegistry> = LazyLock::new(|| ActionRegistry {
    decoders: decoders(),
});

impl ActionRegistry {
    pub fn standard() -> &'static ActionRegistry {
        &STANDARD
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Decodes an action by its `type` and validates it.
    pub fn read(&self, data: &Value) -> Result<Box<dyn Action>, ReadError> {
        let type_name = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ReadError::MissingType)?;
        let decoder = self
            .decoders
            .get(type_name)
            .ok_or_else(|| ReadError::UnknownType {
                name: type_name.to_string(),
            })?;

        let action = decoder(data).map_err(|e| {
            tracing::debug!(action_type = type_name, error = %e, "unable to decode action");
            ReadError::decode(type_name, e)
        })?;
        action.validate()?;
        Ok(action)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads an action using the standard registry.
pub fn read_action(data: &Value) -> Result<Box<dyn Action>, ReadError> {
    ActionRegistry::standard().read(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_types_sorted_and_unique() {
        let mut sorted = ACTION_TYPES.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, ACTION_TYPES);
        assert_eq!(
            ActionRegistry::standard().type_names().count(),
            ACTION_TYPES.len()
        );
    }

    #[test]
    fn test_read_errors() {
        let err = read_action(&json!({"uuid": "ad154980-7bf7-4ab8-8728-545fd6378912"})).unwrap_err();
        assert_eq!(err.to_string(), "field 'type' is required");

        let err = read_action(&json!({"type": "do_magic", "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown type: 'do_magic'");

        let err = read_action(&json!({"type": "set_contact_name"})).unwrap_err();
        assert!(matches!(err, ReadError::Decode { .. }));
    }

    #[test]
    fn test_round_trips() {
        let uuid = "ad154980-7bf7-4ab8-8728-545fd6378912";
        let testers = json!({"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"});
        let child = json!({"uuid": "a8d27b94-d3d0-4a96-8074-0f162f342195", "name": "Child Flow"});
        let bob = json!({"uuid": "1e1ce1e1-9288-4504-869e-022d1003c72a", "name": "Bob"});
        let optin = json!({"uuid": "248be71d-78e9-4d71-a6c4-9981d369e5cb", "name": "Joke Of The Day"});
        let greeting = json!({"uuid": "a8dd2b8d-6e4c-4c2e-8a4e-7b9e9e6bcd65", "name": "Registration Done"});

        let fixtures = vec![
            json!({
                "type": "add_contact_groups",
                "uuid": uuid,
                "groups": [
                    testers,
                    {"name_match": "@(format_location(contact.fields.state)) Members"}
                ]
            }),
            json!({"type": "add_contact_urn", "uuid": uuid, "scheme": "tel", "path": "@results.phone"}),
            json!({
                "type": "add_input_labels",
                "uuid": uuid,
                "labels": [
                    {"uuid": "3f65d88a-95dc-4140-9451-943e94e06fea", "name": "Spam"},
                    {"name_match": "@results.label"}
                ]
            }),
            json!({"type": "add_to_group", "uuid": uuid, "groups": [testers]}),
            json!({
                "type": "call_classifier",
                "uuid": uuid,
                "classifier": {"uuid": "1c06c884-39dd-4ce4-ad9f-9a01cbe6c000", "name": "Booking"},
                "input": "@input.text",
                "result_name": "Intent"
            }),
            json!({
                "type": "call_llm",
                "uuid": uuid,
                "llm": {"uuid": "14115c03-b4c5-49e2-b9ac-390c43e9d7ce", "name": "GPT"},
                "instructions": "Translate to French",
                "input": "@input.text",
                "output_local": "_llm_output"
            }),
            json!({
                "type": "call_resthook",
                "uuid": uuid,
                "resthook": "new-registration",
                "result_name": "Registration"
            }),
            json!({
                "type": "call_webhook",
                "uuid": uuid,
                "method": "POST",
                "url": "http://example.com/@contact.uuid",
                "headers": {"Content-Type": "application/json"},
                "body": "{\"contact\": \"@contact.uuid\"}",
                "result_name": "Webhook"
            }),
            json!({"type": "enter_flow", "uuid": uuid, "flow": child, "terminal": true}),
            json!({
                "type": "forward_ivr",
                "uuid": uuid,
                "urn": "tel:+12065551212",
                "dial_limit_seconds": 60,
                "call_limit_seconds": 7200
            }),
            json!({
                "type": "open_ticket",
                "uuid": uuid,
                "topic": {"uuid": "472a7a73-96cb-4736-b567-056d987cc5b4", "name": "Weather"},
                "note": "@input.text",
                "assignee": {"email": "bob@nyaruka.com", "name": "Bob"},
                "result_name": "Ticket"
            }),
            json!({"type": "play_audio", "uuid": uuid, "audio_url": "http://example.com/hi.m4a"}),
            json!({
                "type": "play_msg",
                "uuid": uuid,
                "text": "Hi @contact.name",
                "audio_url": "http://example.com/hi.m4a"
            }),
            json!({"type": "remove_contact_groups", "uuid": uuid, "all_groups": true}),
            json!({"type": "remove_from_group", "uuid": uuid, "groups": [testers]}),
            json!({"type": "reply", "uuid": uuid, "text": "Hi there"}),
            json!({"type": "request_optin", "uuid": uuid, "optin": optin}),
            json!({"type": "say_msg", "uuid": uuid, "text": "Hi @contact.name"}),
            json!({
                "type": "send_broadcast",
                "uuid": uuid,
                "groups": [testers],
                "contacts": [bob],
                "urns": ["tel:+12065551212"],
                "legacy_vars": ["@results.phone"],
                "text": "Hi everyone",
                "quick_replies": ["Yes", "No"]
            }),
            json!({
                "type": "send_email",
                "uuid": uuid,
                "addresses": ["bob@example.com"],
                "subject": "Hi @contact.name",
                "body": "You said @input.text"
            }),
            json!({
                "type": "send_msg",
                "uuid": uuid,
                "text": "Hi @contact.name",
                "attachments": ["image/jpeg:http://example.com/a.jpg"],
                "quick_replies": ["Yes", "No"],
                "template": greeting,
                "template_variables": ["@contact.name"],
                "topic": "account",
                "all_urns": true
            }),
            json!({"type": "send_optin", "uuid": uuid, "optin": optin}),
            json!({
                "type": "set_contact_channel",
                "uuid": uuid,
                "channel": {"uuid": "57f1078f-88aa-46f4-a59a-948a5739c03d", "name": "Nexmo"}
            }),
            json!({
                "type": "set_contact_field",
                "uuid": uuid,
                "field": {"key": "gender", "name": "Gender"},
                "value": "Male"
            }),
            json!({"type": "set_contact_language", "uuid": uuid, "language": "fra"}),
            json!({"type": "set_contact_name", "uuid": uuid, "name": "Bob"}),
            json!({"type": "set_contact_status", "uuid": uuid, "status": "blocked"}),
            json!({"type": "set_contact_timezone", "uuid": uuid, "timezone": "Africa/Kigali"}),
            json!({
                "type": "set_run_local",
                "uuid": uuid,
                "local": "counter",
                "value": "1",
                "operation": "increment"
            }),
            json!({
                "type": "set_run_result",
                "uuid": uuid,
                "name": "Gender",
                "value": "m",
                "category": "Male"
            }),
            json!({"type": "start_flow", "uuid": uuid, "flow": child}),
            json!({
                "type": "start_session",
                "uuid": uuid,
                "contact_query": "age > 10",
                "flow": child,
                "create_contact": true,
                "exclusions": {"in_a_flow": true}
            }),
            json!({
                "type": "transfer_airtime",
                "uuid": uuid,
                "amounts": {"RWF": 500, "USD": 0.5},
                "result_name": "Reward Transfer"
            }),
            json!({
                "type": "trigger_session",
                "uuid": uuid,
                "flow": child,
                "contact": bob,
                "interrupt": false
            }),
            json!({"type": "update_contact", "uuid": uuid, "name": "Bob", "status": "active"}),
        ];

        let covered: Vec<&str> = fixtures.iter().filter_map(|f| f["type"].as_str()).collect();
        for name in ACTION_TYPES {
            assert!(covered.contains(name), "no fixture for action type '{name}'");
        }

        for fixture in fixtures {
            let action = read_action(&fixture).unwrap_or_else(|e| panic!("{fixture}: {e}"));
            assert_eq!(action.to_json().unwrap(), fixture);
        }
    }
}
