//! Modifiers: idempotent changes to a contact or its tickets.
//!
//! Actions never change a contact directly. They build a [`Modifier`] and
//! hand it to [`apply`], which makes the change, logs the event describing
//! it and re-evaluates dynamic group membership. A modifier that finds
//! nothing to change returns `false` and logs nothing.
//!
//! Modifiers hold resolved assets. On the wire they carry references, and
//! [`ModifierRegistry::read`] resolves them again, degrading to
//! [`ReadOutcome::NoModifier`] when an asset it can't do without is gone.

mod contact;
mod groups;
mod registry;
mod tickets;
mod urns;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub use groups::reevaluate_groups;
pub use registry::{read_modifier, ModifierRegistry, ReadOutcome};

use crate::assets::{Channel, Field, Group, SessionAssets, Topic, User};
use crate::engine::Engine;
use crate::run::EventCallback;
use crate::types::{
    ChannelReference, Contact, ContactStatus, Environment, FieldReference, GroupReference,
    TopicReference, Urn, UserReference,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupsModification {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrnModification {
    Append,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrnsModification {
    Append,
    Remove,
    Set,
}

/// A change to make to a contact.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Modifier {
    Name {
        name: String,
    },
    /// `None` clears the language.
    Language {
        language: Option<String>,
    },
    Timezone {
        timezone: Option<Tz>,
    },
    Status {
        status: ContactStatus,
    },
    /// Makes the channel the preferred channel for the URNs it can send to.
    Channel {
        channel: Arc<Channel>,
    },
    /// Sets a field from raw text; empty text clears it.
    Field {
        field: Arc<Field>,
        value: String,
    },
    Groups {
        groups: Vec<Arc<Group>>,
        modification: GroupsModification,
    },
    Urn {
        urn: Urn,
        modification: UrnModification,
    },
    Urns {
        urns: Vec<Urn>,
        modification: UrnsModification,
    },
    Affinity {
        urn: Urn,
        channel: Arc<Channel>,
    },
    Seen {
        seen_on: DateTime<Utc>,
    },
    TicketOpen {
        ticket_uuid: Uuid,
        topic: Arc<Topic>,
        assignee: Option<Arc<User>>,
        note: String,
    },
    TicketClose {
        ticket_uuids: Vec<Uuid>,
    },
    TicketReopen {
        ticket_uuids: Vec<Uuid>,
    },
    /// `None` unassigns the tickets.
    TicketAssignee {
        ticket_uuids: Vec<Uuid>,
        assignee: Option<Arc<User>>,
    },
    TicketTopic {
        ticket_uuids: Vec<Uuid>,
        topic: Arc<Topic>,
    },
    TicketNote {
        ticket_uuids: Vec<Uuid>,
        note: String,
    },
}

/// Wire shape of a modifier, with references in place of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ModifierEnvelope {
    Name {
        name: String,
    },
    Language {
        #[serde(default)]
        language: String,
    },
    Timezone {
        #[serde(default)]
        timezone: String,
    },
    Status {
        status: ContactStatus,
    },
    Channel {
        channel: ChannelReference,
    },
    Field {
        field: FieldReference,
        /// Anything other than a string (including `null`) clears the field.
        #[serde(default, deserialize_with = "string_or_empty")]
        value: String,
    },
    Groups {
        groups: Vec<GroupReference>,
        modification: GroupsModification,
    },
    Urn {
        urn: Urn,
        modification: UrnModification,
    },
    Urns {
        urns: Vec<Urn>,
        modification: UrnsModification,
    },
    Affinity {
        urn: Urn,
        channel: ChannelReference,
    },
    Seen {
        seen_on: DateTime<Utc>,
    },
    #[serde(alias = "ticket")]
    TicketOpen {
        ticket_uuid: Uuid,
        topic: TopicReference,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<UserReference>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        note: String,
    },
    TicketClose {
        ticket_uuids: Vec<Uuid>,
    },
    TicketReopen {
        ticket_uuids: Vec<Uuid>,
    },
    TicketAssignee {
        ticket_uuids: Vec<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<UserReference>,
    },
    TicketTopic {
        ticket_uuids: Vec<Uuid>,
        topic: TopicReference,
    },
    TicketNote {
        ticket_uuids: Vec<Uuid>,
        note: String,
    },
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

/// Every modifier type, plus `ticket`, the older name of `ticket_open`.
pub const MODIFIER_TYPES: &[&str] = &[
    "affinity",
    "channel",
    "field",
    "groups",
    "language",
    "name",
    "seen",
    "status",
    "ticket",
    "ticket_assignee",
    "ticket_close",
    "ticket_note",
    "ticket_open",
    "ticket_reopen",
    "ticket_topic",
    "timezone",
    "urn",
    "urns",
];

impl Modifier {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Name { .. } => "name",
            Self::Language { .. } => "language",
            Self::Timezone { .. } => "timezone",
            Self::Status { .. } => "status",
            Self::Channel { .. } => "channel",
            Self::Field { .. } => "field",
            Self::Groups { .. } => "groups",
            Self::Urn { .. } => "urn",
            Self::Urns { .. } => "urns",
            Self::Affinity { .. } => "affinity",
            Self::Seen { .. } => "seen",
            Self::TicketOpen { .. } => "ticket_open",
            Self::TicketClose { .. } => "ticket_close",
            Self::TicketReopen { .. } => "ticket_reopen",
            Self::TicketAssignee { .. } => "ticket_assignee",
            Self::TicketTopic { .. } => "ticket_topic",
            Self::TicketNote { .. } => "ticket_note",
        }
    }

    /// Makes the change, logging an event if anything changed. Does not
    /// re-evaluate groups; use [`apply`] for that.
    pub fn apply(
        &self,
        engine: &Engine,
        env: &Environment,
        contact: &mut Contact,
        log: &mut EventCallback<'_>,
    ) -> bool {
        match self {
            Self::Name { name } => contact::apply_name(contact, name, log),
            Self::Language { language } => {
                contact::apply_language(contact, language.as_deref(), log)
            }
            Self::Timezone { timezone } => contact::apply_timezone(contact, *timezone, log),
            Self::Status { status } => contact::apply_status(contact, *status, log),
            Self::Channel { channel } => contact::apply_channel(contact, channel, log),
            Self::Field { field, value } => {
                contact::apply_field(engine, env, contact, field, value, log)
            }
            Self::Seen { seen_on } => contact::apply_seen(contact, *seen_on, log),
            Self::Groups {
                groups,
                modification,
            } => groups::apply_groups(contact, groups, *modification, log),
            Self::Urn { urn, modification } => {
                let modification = match modification {
                    UrnModification::Append => UrnsModification::Append,
                    UrnModification::Remove => UrnsModification::Remove,
                };
                urns::apply_urns(engine, env, contact, std::slice::from_ref(urn), modification, log)
            }
            Self::Urns { urns, modification } => {
                urns::apply_urns(engine, env, contact, urns, *modification, log)
            }
            Self::Affinity { urn, channel } => urns::apply_affinity(contact, urn, channel, log),
            Self::TicketOpen {
                ticket_uuid,
                topic,
                assignee,
                note,
            } => tickets::apply_open(contact, *ticket_uuid, topic, assignee.as_deref(), note, log),
            Self::TicketClose { ticket_uuids } => tickets::apply_close(contact, ticket_uuids, log),
            Self::TicketReopen { ticket_uuids } => {
                tickets::apply_reopen(contact, ticket_uuids, log)
            }
            Self::TicketAssignee {
                ticket_uuids,
                assignee,
            } => tickets::apply_assignee(contact, ticket_uuids, assignee.as_deref(), log),
            Self::TicketTopic {
                ticket_uuids,
                topic,
            } => tickets::apply_topic(contact, ticket_uuids, topic, log),
            Self::TicketNote { ticket_uuids, note } => {
                tickets::apply_note(contact, ticket_uuids, note, log)
            }
        }
    }

    pub(crate) fn envelope(&self) -> ModifierEnvelope {
        match self {
            Self::Name { name } => ModifierEnvelope::Name { name: name.clone() },
            Self::Language { language } => ModifierEnvelope::Language {
                language: language.clone().unwrap_or_default(),
            },
            Self::Timezone { timezone } => ModifierEnvelope::Timezone {
                timezone: timezone.map(|tz| tz.name().to_string()).unwrap_or_default(),
            },
            Self::Status { status } => ModifierEnvelope::Status { status: *status },
            Self::Channel { channel } => ModifierEnvelope::Channel {
                channel: channel.reference(),
            },
            Self::Field { field, value } => ModifierEnvelope::Field {
                field: field.reference(),
                value: value.clone(),
            },
            Self::Groups {
                groups,
                modification,
            } => ModifierEnvelope::Groups {
                groups: groups.iter().map(|g| g.reference()).collect(),
                modification: *modification,
            },
            Self::Urn { urn, modification } => ModifierEnvelope::Urn {
                urn: urn.clone(),
                modification: *modification,
            },
            Self::Urns { urns, modification } => ModifierEnvelope::Urns {
                urns: urns.clone(),
                modification: *modification,
            },
            Self::Affinity { urn, channel } => ModifierEnvelope::Affinity {
                urn: urn.clone(),
                channel: channel.reference(),
            },
            Self::Seen { seen_on } => ModifierEnvelope::Seen { seen_on: *seen_on },
            Self::TicketOpen {
                ticket_uuid,
                topic,
                assignee,
                note,
            } => ModifierEnvelope::TicketOpen {
                ticket_uuid: *ticket_uuid,
                topic: topic.reference(),
                assignee: assignee.as_ref().map(|u| u.reference()),
                note: note.clone(),
            },
            Self::TicketClose { ticket_uuids } => ModifierEnvelope::TicketClose {
                ticket_uuids: ticket_uuids.clone(),
            },
            Self::TicketReopen { ticket_uuids } => ModifierEnvelope::TicketReopen {
                ticket_uuids: ticket_uuids.clone(),
            },
            Self::TicketAssignee {
                ticket_uuids,
                assignee,
            } => ModifierEnvelope::TicketAssignee {
                ticket_uuids: ticket_uuids.clone(),
                assignee: assignee.as_ref().map(|u| u.reference()),
            },
            Self::TicketTopic {
                ticket_uuids,
                topic,
            } => ModifierEnvelope::TicketTopic {
                ticket_uuids: ticket_uuids.clone(),
                topic: topic.reference(),
            },
            Self::TicketNote { ticket_uuids, note } => ModifierEnvelope::TicketNote {
                ticket_uuids: ticket_uuids.clone(),
                note: note.clone(),
            },
        }
    }
}

impl Serialize for Modifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.envelope().serialize(serializer)
    }
}

/// Applies a modifier and, if it changed anything, re-evaluates the
/// contact's dynamic groups. Returns whether the contact was modified.
pub fn apply(
    engine: &Engine,
    env: &Environment,
    assets: &SessionAssets,
    contact: &mut Contact,
    modifier: &Modifier,
    log: &mut EventCallback<'_>,
) -> bool {
    let modified = modifier.apply(engine, env, contact, log);
    if modified {
        reevaluate_groups(assets, contact, log);
    }
    modified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::test_support;
    use serde_json::json;

    fn run_apply(contact: &mut Contact, modifier: &Modifier) -> (bool, Vec<Event>) {
        let engine = Engine::default();
        let assets = test_support::default_assets();
        let env = Environment::default();
        let mut events = Vec::new();
        let modified = apply(&engine, &env, &assets, contact, modifier, &mut |e: Event| {
            events.push(e)
        });
        (modified, events)
    }

    #[test]
    fn test_name_is_idempotent() {
        let mut contact = test_support::default_contact();
        let modifier = Modifier::Name {
            name: "Robert".into(),
        };

        let (modified, events) = run_apply(&mut contact, &modifier);
        assert!(modified);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_name(), "contact_name_changed");

        let (modified, events) = run_apply(&mut contact, &modifier);
        assert!(!modified);
        assert!(events.is_empty());
    }

    #[test]
    fn test_status_change_reevaluates_groups() {
        let mut contact = test_support::default_contact();
        assert!(!contact.groups().is_empty());

        let (modified, events) = run_apply(
            &mut contact,
            &Modifier::Status {
                status: ContactStatus::Blocked,
            },
        );
        assert!(modified);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].type_name(), "contact_status_changed");
        match &events[1].kind {
            EventKind::ContactGroupsChanged(e) => {
                assert!(e.groups_added.is_empty());
                assert!(!e.groups_removed.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(contact.groups().is_empty());
    }

    #[test]
    fn test_serializes_as_references() {
        let assets = test_support::default_assets();
        let field = assets.fields().get_by_key("gender").unwrap();
        let modifier = Modifier::Field {
            field,
            value: "Male".into(),
        };
        assert_eq!(
            serde_json::to_value(&modifier).unwrap(),
            json!({"type": "field", "field": {"key": "gender", "name": "Gender"}, "value": "Male"})
        );
        assert_eq!(modifier.type_name(), "field");
    }
}
