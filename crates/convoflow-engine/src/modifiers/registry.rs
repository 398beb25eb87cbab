//! Reading modifiers from JSON, resolving their asset references.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use chrono_tz::Tz;
use serde_json::Value;

use super::{Modifier, ModifierEnvelope, MODIFIER_TYPES};
use crate::assets::{SessionAssets, User};
use crate::errors::ReadError;
use crate::missing::MissingCallback;
use crate::types::{AssetReference, UserReference};

/// Result of reading a modifier whose assets may have been deleted.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Modifier(Modifier),
    /// An asset the modifier can't do without no longer exists. Nothing
    /// should happen, and the missing asset has been reported.
    NoModifier,
}

impl ReadOutcome {
    pub fn into_modifier(self) -> Option<Modifier> {
        match self {
            Self::Modifier(m) => Some(m),
            Self::NoModifier => None,
        }
    }
}

#[derive(Debug)]
pub struct ModifierRegistry {
    types: BTreeSet<&'static str>,
}

static STANDARD: LazyLock<ModifierRegistry> = LazyLock::new(|| ModifierRegistry {
    types: MODIFIER_TYPES.iter().copied().collect(),
});

impl ModifierRegistry {
    pub fn standard() -> &'static ModifierRegistry {
        &STANDARD
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.iter().copied()
    }

    pub fn read(
        &self,
        assets: &SessionAssets,
        data: &Value,
        missing: &mut MissingCallback<'_>,
    ) -> Result<ReadOutcome, ReadError> {
        let type_name = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ReadError::MissingType)?;
        if !self.types.contains(type_name) {
            return Err(ReadError::UnknownType {
                name: type_name.to_string(),
            });
        }

        let envelope: ModifierEnvelope = serde_json::from_value(data.clone()).map_err(|e| {
            tracing::debug!(modifier_type = type_name, error = %e, "unable to decode modifier");
            ReadError::decode(type_name, e)
        })?;
        resolve(assets, envelope, missing)
    }
}

/// Reads a modifier using the standard registry.
pub fn read_modifier(
    assets: &SessionAssets,
    data: &Value,
    missing: &mut MissingCallback<'_>,
) -> Result<ReadOutcome, ReadError> {
    ModifierRegistry::standard().read(assets, data, missing)
}

fn resolve_user(
    assets: &SessionAssets,
    reference: &UserReference,
    missing: &mut MissingCallback<'_>,
) -> Option<Arc<User>> {
    let user = reference.email().and_then(|e| assets.users().find_by_email(e));
    if user.is_none() {
        missing(AssetReference::User(reference.clone()), None);
    }
    user
}

fn resolve(
    assets: &SessionAssets,
    envelope: ModifierEnvelope,
    missing: &mut MissingCallback<'_>,
) -> Result<ReadOutcome, ReadError> {
    use ReadOutcome::NoModifier;

    let modifier = match envelope {
        ModifierEnvelope::Name { name } => Modifier::Name { name },
        ModifierEnvelope::Language { language } => Modifier::Language {
            language: Some(language).filter(|l| !l.is_empty()),
        },
        ModifierEnvelope::Timezone { timezone } => {
            let timezone = match timezone.as_str() {
                "" => None,
                name => Some(name.parse::<Tz>().map_err(|_| {
                    ReadError::validation(format!("unrecognized timezone: '{name}'"))
                })?),
            };
            Modifier::Timezone { timezone }
        }
        ModifierEnvelope::Status { status } => Modifier::Status { status },
        ModifierEnvelope::Channel { channel } => match assets.channels().get(channel.uuid) {
            Some(resolved) => Modifier::Channel { channel: resolved },
            None => {
                missing(AssetReference::Channel(channel), None);
                return Ok(NoModifier);
            }
        },
        ModifierEnvelope::Field { field, value } => match assets.fields().get_by_key(&field.key) {
            Some(resolved) => Modifier::Field {
                field: resolved,
                value,
            },
            None => {
                missing(AssetReference::Field(field), None);
                return Ok(NoModifier);
            }
        },
        ModifierEnvelope::Groups {
            groups,
            modification,
        } => {
            let mut resolved = Vec::with_capacity(groups.len());
            for reference in groups {
                match reference.uuid().and_then(|u| assets.groups().get(u)) {
                    Some(group) => resolved.push(group),
                    None => missing(AssetReference::Group(reference), None),
                }
            }
            if resolved.is_empty() {
                return Ok(NoModifier);
            }
            Modifier::Groups {
                groups: resolved,
                modification,
            }
        }
        ModifierEnvelope::Urn { urn, modification } => Modifier::Urn { urn, modification },
        ModifierEnvelope::Urns { urns, modification } => Modifier::Urns { urns, modification },
        ModifierEnvelope::Affinity { urn, channel } => match assets.channels().get(channel.uuid) {
            Some(resolved) => Modifier::Affinity {
                urn,
                channel: resolved,
            },
            None => {
                missing(AssetReference::Channel(channel), None);
                return Ok(NoModifier);
            }
        },
        ModifierEnvelope::Seen { seen_on } => Modifier::Seen { seen_on },
        ModifierEnvelope::TicketOpen {
            ticket_uuid,
            topic,
            assignee,
            note,
        } => {
            let Some(resolved_topic) = assets.topics().get(topic.uuid) else {
                missing(AssetReference::Topic(topic), None);
                return Ok(NoModifier);
            };
            // a deleted assignee leaves the ticket unassigned
            let assignee = assignee.and_then(|r| resolve_user(assets, &r, missing));
            Modifier::TicketOpen {
                ticket_uuid,
                topic: resolved_topic,
                assignee,
                note,
            }
        }
        ModifierEnvelope::TicketClose { ticket_uuids } => Modifier::TicketClose { ticket_uuids },
        ModifierEnvelope::TicketReopen { ticket_uuids } => Modifier::TicketReopen { ticket_uuids },
        ModifierEnvelope::TicketAssignee {
            ticket_uuids,
            assignee,
        } => {
            let assignee = match assignee {
                None => None,
                Some(reference) => match resolve_user(assets, &reference, missing) {
                    Some(user) => Some(user),
                    None => return Ok(NoModifier),
                },
            };
            Modifier::TicketAssignee {
                ticket_uuids,
                assignee,
            }
        }
        ModifierEnvelope::TicketTopic {
            ticket_uuids,
            topic,
        } => match assets.topics().get(topic.uuid) {
            Some(resolved) => Modifier::TicketTopic {
                ticket_uuids,
                topic: resolved,
            },
            None => {
                missing(AssetReference::Topic(topic), None);
                return Ok(NoModifier);
            }
        },
        ModifierEnvelope::TicketNote { ticket_uuids, note } => {
            Modifier::TicketNote { ticket_uuids, note }
        }
    };
    Ok(ReadOutcome::Modifier(modifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missing::ignore_missing;
    use crate::test_support;
    use serde_json::json;

    #[test]
    fn test_read_errors() {
        let assets = test_support::default_assets();
        let err = read_modifier(&assets, &json!({"name": "Bob"}), &mut ignore_missing).unwrap_err();
        assert_eq!(err, ReadError::MissingType);

        let err =
            read_modifier(&assets, &json!({"type": "frobnicate"}), &mut ignore_missing).unwrap_err();
        assert_eq!(err.to_string(), "unknown type: 'frobnicate'");

        let err = read_modifier(
            &assets,
            &json!({"type": "timezone", "timezone": "Cuenca/Ecuador"}),
            &mut ignore_missing,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unrecognized timezone: 'Cuenca/Ecuador'");
    }

    #[test]
    fn test_missing_field_is_no_modifier() {
        let assets = test_support::default_assets();
        let mut reported = Vec::new();
        let outcome = read_modifier(
            &assets,
            &json!({"type": "field", "field": {"key": "shoe_size", "name": "Shoe Size"}, "value": "9"}),
            &mut |r: AssetReference, _: Option<String>| reported.push(r.to_string()),
        )
        .unwrap();
        assert_eq!(outcome, ReadOutcome::NoModifier);
        assert_eq!(reported, vec!["field[key=shoe_size,name=Shoe Size]"]);
    }

    #[test]
    fn test_groups_keep_surviving_subset() {
        let assets = test_support::default_assets();
        let testers = assets.groups().find_by_name("Testers").unwrap();
        let mut reported = Vec::new();
        let data = json!({
            "type": "groups",
            "modification": "add",
            "groups": [
                {"uuid": testers.uuid, "name": "Testers"},
                {"uuid": "33382939-babf-4982-9395-8793feb4e7c6", "name": "Deleted"}
            ]
        });
        let outcome = read_modifier(&assets, &data, &mut |r: AssetReference, _: Option<String>| {
            reported.push(r)
        })
        .unwrap();

        let modifier = outcome.into_modifier().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(
            serde_json::to_value(&modifier).unwrap(),
            json!({
                "type": "groups",
                "modification": "add",
                "groups": [{"uuid": testers.uuid, "name": "Testers"}]
            })
        );
    }

    #[test]
    fn test_ticket_alias() {
        let assets = test_support::default_assets();
        let general = assets.topics().find_by_name("General").unwrap();
        let data = json!({
            "type": "ticket",
            "ticket_uuid": "7481888c-07dd-47dc-bf22-ef7448696ffe",
            "topic": {"uuid": general.uuid, "name": "General"},
            "assignee": {"email": "gone@nyaruka.com", "name": "Gone"},
            "note": "help"
        });
        let mut reported = Vec::new();
        let outcome = read_modifier(&assets, &data, &mut |r: AssetReference, _: Option<String>| {
            reported.push(r)
        })
        .unwrap();

        let modifier = outcome.into_modifier().unwrap();
        assert_eq!(modifier.type_name(), "ticket_open");
        assert!(matches!(modifier, Modifier::TicketOpen { assignee: None, .. }));
        assert_eq!(reported.len(), 1);
    }

    #[test]
    fn test_field_value_not_a_string() {
        let assets = test_support::default_assets();
        for value in [json!(null), json!(12), json!({"text": "male"})] {
            let data = json!({"type": "field", "field": {"key": "gender", "name": "Gender"}, "value": value});
            let outcome = read_modifier(&assets, &data, &mut ignore_missing).unwrap();
            match outcome {
                ReadOutcome::Modifier(Modifier::Field { field, value }) => {
                    assert_eq!(field.key, "gender");
                    assert_eq!(value, "");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn test_read_round_trips() {
        let assets = test_support::default_assets();
        let nexmo = json!({"uuid": test_support::SEND_CHANNEL_UUID, "name": "Nexmo"});
        let general = json!({"uuid": "0d9a2c56-6fc2-4f27-93c5-a6322e26b740", "name": "General"});
        let bob = json!({"email": "bob@nyaruka.com", "name": "Bob"});
        let tickets = json!(["7481888c-07dd-47dc-bf22-ef7448696ffe"]);

        let fixtures = [
            json!({"type": "affinity", "urn": "tel:+250788123123", "channel": nexmo}),
            json!({"type": "channel", "channel": nexmo}),
            json!({"type": "field", "field": {"key": "gender", "name": "Gender"}, "value": "Male"}),
            json!({
                "type": "groups",
                "groups": [{"uuid": test_support::TESTERS_UUID, "name": "Testers"}],
                "modification": "remove"
            }),
            json!({"type": "language", "language": "spa"}),
            json!({"type": "name", "name": "Bob"}),
            json!({"type": "seen", "seen_on": "2022-01-31T15:36:30Z"}),
            json!({"type": "status", "status": "blocked"}),
            json!({
                "type": "ticket",
                "ticket_uuid": "7481888c-07dd-47dc-bf22-ef7448696ffe",
                "topic": general,
                "assignee": bob,
                "note": "help"
            }),
            json!({"type": "ticket_assignee", "ticket_uuids": tickets, "assignee": bob}),
            json!({"type": "ticket_close", "ticket_uuids": tickets}),
            json!({"type": "ticket_note", "ticket_uuids": tickets, "note": "call back"}),
            json!({
                "type": "ticket_open",
                "ticket_uuid": "7481888c-07dd-47dc-bf22-ef7448696ffe",
                "topic": general
            }),
            json!({"type": "ticket_reopen", "ticket_uuids": tickets}),
            json!({"type": "ticket_topic", "ticket_uuids": tickets, "topic": general}),
            json!({"type": "timezone", "timezone": "Africa/Kigali"}),
            json!({"type": "urn", "urn": "tel:+250788123123", "modification": "append"}),
            json!({"type": "urns", "urns": ["tel:+250788123123"], "modification": "set"}),
        ];

        let covered: BTreeSet<&str> = fixtures.iter().filter_map(|f| f["type"].as_str()).collect();
        for name in MODIFIER_TYPES {
            assert!(covered.contains(name), "no fixture for modifier type '{name}'");
        }

        for data in fixtures {
            let modifier = read_modifier(&assets, &data, &mut ignore_missing)
                .unwrap()
                .into_modifier()
                .unwrap_or_else(|| panic!("no modifier for {data}"));

            // the older type name is always written back as the current one
            let mut expected = data.clone();
            if expected["type"] == "ticket" {
                expected["type"] = json!("ticket_open");
            }
            assert_eq!(serde_json::to_value(&modifier).unwrap(), expected);
        }
    }
}
