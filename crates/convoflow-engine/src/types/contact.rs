//! The contact a session is about.
//!
//! Contacts are owned by the session; the core only reads them and mutates
//! them through modifiers and replayed events.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::reference::{AssetReference, GroupReference};
use super::ticket::{Ticket, TicketList};
use super::urn::Urn;
use super::value::FieldValue;
use crate::assets::{Channel, ChannelRole, Group, SessionAssets};
use crate::errors::ReadError;
use crate::missing::MissingCallback;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Active,
    Blocked,
    Stopped,
    Archived,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Stopped => "stopped",
            Self::Archived => "archived",
        }
    }
}

/// A URN paired with the channel a message to it would go out on.
#[derive(Debug, Clone)]
pub struct Destination {
    pub urn: Urn,
    pub channel: Arc<Channel>,
}

/// Groups a contact belongs to, in the order they were joined.
#[derive(Debug, Clone, Default)]
pub struct GroupList(Vec<Arc<Group>>);

impl GroupList {
    pub fn all(&self) -> &[Arc<Group>] {
        &self.0
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.0.iter().any(|g| g.uuid == uuid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a group, returning false if already a member.
    pub fn add(&mut self, group: Arc<Group>) -> bool {
        if self.contains(group.uuid) {
            return false;
        }
        self.0.push(group);
        true
    }

    /// Removes a group, returning false if not a member.
    pub fn remove(&mut self, uuid: Uuid) -> bool {
        let before = self.0.len();
        self.0.retain(|g| g.uuid != uuid);
        self.0.len() != before
    }

    pub fn references(&self) -> Vec<GroupReference> {
        self.0.iter().map(|g| g.reference()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Contact {
    uuid: Uuid,
    id: Option<i64>,
    name: String,
    language: Option<String>,
    timezone: Option<Tz>,
    status: ContactStatus,
    created_on: DateTime<Utc>,
    last_seen_on: Option<DateTime<Utc>>,
    urns: Vec<Urn>,
    groups: GroupList,
    fields: BTreeMap<String, FieldValue>,
    tickets: TicketList,
}

/// JSON shape of a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEnvelope {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urns: Vec<Urn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<Ticket>,
}

impl Contact {
    pub fn new(uuid: Uuid, name: impl Into<String>, created_on: DateTime<Utc>) -> Self {
        Self {
            uuid,
            id: None,
            name: name.into(),
            language: None,
            timezone: None,
            status: ContactStatus::Active,
            created_on,
            last_seen_on: None,
            urns: Vec::new(),
            groups: GroupList::default(),
            fields: BTreeMap::new(),
            tickets: TicketList::default(),
        }
    }

    /// Reads a contact, resolving its groups against the session assets.
    /// Missing groups and unknown fields are reported and dropped.
    pub fn read(
        assets: &SessionAssets,
        data: &Value,
        missing: &mut MissingCallback<'_>,
    ) -> Result<Self, ReadError> {
        let envelope: ContactEnvelope =
            serde_json::from_value(data.clone()).map_err(|e| ReadError::Decode {
                message: format!("unable to read contact: {e}"),
            })?;
        Self::from_envelope(assets, envelope, missing)
    }

    pub fn from_envelope(
        assets: &SessionAssets,
        envelope: ContactEnvelope,
        missing: &mut MissingCallback<'_>,
    ) -> Result<Self, ReadError> {
        let timezone = match envelope.timezone.as_deref() {
            None | Some("") => None,
            Some(name) => Some(name.parse::<Tz>().map_err(|_| ReadError::Validation {
                message: format!("unrecognized timezone: '{name}'"),
            })?),
        };

        let mut groups = GroupList::default();
        for reference in envelope.groups {
            match reference.uuid().and_then(|u| assets.groups().get(u)) {
                Some(group) => {
                    groups.add(group);
                }
                None => missing(AssetReference::Group(reference), None),
            }
        }

        let mut fields = BTreeMap::new();
        for (key, value) in envelope.fields {
            match assets.fields().get_by_key(&key) {
                Some(_) => {
                    fields.insert(key, value);
                }
                None => missing(
                    AssetReference::Field(super::reference::FieldReference::new(key, "")),
                    None,
                ),
            }
        }

        Ok(Self {
            uuid: envelope.uuid,
            id: envelope.id,
            name: envelope.name,
            language: envelope.language.filter(|l| !l.is_empty()),
            timezone,
            status: envelope.status,
            created_on: envelope.created_on,
            last_seen_on: envelope.last_seen_on,
            urns: envelope.urns,
            groups,
            fields,
            tickets: TicketList::new(envelope.tickets),
        })
    }

    pub fn to_envelope(&self) -> ContactEnvelope {
        ContactEnvelope {
            uuid: self.uuid,
            id: self.id,
            name: self.name.clone(),
            language: self.language.clone(),
            timezone: self.timezone.map(|tz| tz.name().to_string()),
            status: self.status,
            created_on: self.created_on,
            last_seen_on: self.last_seen_on,
            urns: self.urns.clone(),
            groups: self.groups.references(),
            fields: self.fields.clone(),
            tickets: self.tickets.all().to_vec(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language;
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    pub fn set_timezone(&mut self, timezone: Option<Tz>) {
        self.timezone = timezone;
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ContactStatus) {
        self.status = status;
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn last_seen_on(&self) -> Option<DateTime<Utc>> {
        self.last_seen_on
    }

    pub fn set_last_seen_on(&mut self, seen_on: DateTime<Utc>) {
        self.last_seen_on = Some(seen_on);
    }

    // ---------------------------------------------------------------------
    // URNs
    // ---------------------------------------------------------------------

    pub fn urns(&self) -> &[Urn] {
        &self.urns
    }

    pub fn has_urn(&self, urn: &Urn) -> bool {
        let identity = urn.identity();
        self.urns.iter().any(|u| u.identity() == identity)
    }

    /// Appends a URN, returning false if the contact already has it.
    pub fn add_urn(&mut self, urn: Urn) -> bool {
        if self.has_urn(&urn) {
            return false;
        }
        self.urns.push(urn);
        true
    }

    /// Removes a URN by identity, returning false if the contact didn't have it.
    pub fn remove_urn(&mut self, urn: &Urn) -> bool {
        let identity = urn.identity();
        let before = self.urns.len();
        self.urns.retain(|u| u.identity() != identity);
        self.urns.len() != before
    }

    /// Replaces all URNs, returning false if they were the same.
    pub fn set_urns(&mut self, urns: Vec<Urn>) -> bool {
        if self.urns == urns {
            return false;
        }
        self.urns = urns;
        true
    }

    pub fn clear_urns(&mut self) -> bool {
        let had = !self.urns.is_empty();
        self.urns.clear();
        had
    }

    /// Gives the URN affinity for the channel and moves it to the front.
    /// Returns false if nothing changed.
    pub fn set_affinity(&mut self, urn: &Urn, channel: &Channel) -> bool {
        let identity = urn.identity();
        let Some(pos) = self.urns.iter().position(|u| u.identity() == identity) else {
            return false;
        };
        let updated = self.urns[pos].with_channel(Some(channel.uuid));
        if pos == 0 && self.urns[0] == updated {
            return false;
        }
        self.urns.remove(pos);
        self.urns.insert(0, updated);
        true
    }

    /// Sets the preferred channel: all URNs the channel can send to get
    /// affinity for it and move to the front. Returns false if nothing changed.
    pub fn update_preferred_channel(&mut self, channel: &Channel) -> bool {
        let before = self.urns.clone();
        let (mut matching, rest): (Vec<Urn>, Vec<Urn>) = self
            .urns
            .drain(..)
            .partition(|u| channel.supports_scheme(u.scheme()));
        for urn in matching.iter_mut() {
            *urn = urn.with_channel(Some(channel.uuid));
        }
        matching.extend(rest);
        self.urns = matching;
        self.urns != before
    }

    /// Resolves where messages to this contact can go. Only the first
    /// destination is returned unless `all_urns` is set.
    pub fn resolve_destinations(&self, assets: &SessionAssets, all_urns: bool) -> Vec<Destination> {
        let senders: Vec<Arc<Channel>> = assets
            .channels()
            .all()
            .into_iter()
            .filter(|c| c.has_role(ChannelRole::Send))
            .collect();

        let mut destinations = Vec::new();
        for urn in &self.urns {
            let affinity = urn
                .channel_uuid()
                .and_then(|u| senders.iter().find(|c| c.uuid == u))
                .filter(|c| c.supports_scheme(urn.scheme()));
            let channel = affinity
                .or_else(|| senders.iter().find(|c| c.supports_scheme(urn.scheme())))
                .cloned();

            if let Some(channel) = channel {
                destinations.push(Destination {
                    urn: urn.clone(),
                    channel,
                });
                if !all_urns {
                    break;
                }
            }
        }
        destinations
    }

    /// The channel of the first destination, if any.
    pub fn preferred_channel(&self, assets: &SessionAssets) -> Option<Arc<Channel>> {
        self.resolve_destinations(assets, false)
            .into_iter()
            .next()
            .map(|d| d.channel)
    }

    // ---------------------------------------------------------------------
    // Groups, fields, tickets
    // ---------------------------------------------------------------------

    pub fn groups(&self) -> &GroupList {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupList {
        &mut self.groups
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Sets or clears a field value, returning false if it was unchanged.
    pub fn set_field_value(&mut self, key: &str, value: Option<FieldValue>) -> bool {
        let current = self.fields.get(key);
        if current == value.as_ref() {
            return false;
        }
        match value {
            Some(v) => {
                self.fields.insert(key.to_string(), v);
            }
            None => {
                self.fields.remove(key);
            }
        }
        true
    }

    pub fn tickets(&self) -> &TicketList {
        &self.tickets
    }

    pub fn tickets_mut(&mut self) -> &mut TicketList {
        &mut self.tickets
    }

    /// The contact as seen by dynamic group queries.
    pub fn query_context(&self, assets: &SessionAssets) -> Value {
        let mut urns: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for urn in &self.urns {
            urns.entry(urn.scheme().to_string())
                .or_default()
                .push(urn.path().to_string());
        }
        let urns_by_scheme: serde_json::Map<String, Value> = urns
            .into_iter()
            .map(|(scheme, paths)| {
                let first = paths.first().cloned().unwrap_or_default();
                (scheme, Value::String(first))
            })
            .collect();

        let mut fields = serde_json::Map::new();
        for (key, value) in &self.fields {
            let typed = assets
                .fields()
                .get_by_key(key)
                .map(|f| value.typed(f.value_type))
                .unwrap_or_else(|| Value::String(value.text.clone()));
            fields.insert(key.clone(), typed);
        }

        json!({
            "uuid": self.uuid,
            "id": self.id,
            "name": self.name,
            "language": self.language,
            "timezone": self.timezone.map(|tz| tz.name().to_string()),
            "status": self.status.as_str(),
            "created_on": self.created_on.to_rfc3339(),
            "last_seen_on": self.last_seen_on.map(|d| d.to_rfc3339()),
            "urns": urns_by_scheme,
            "urn_count": self.urns.len(),
            "fields": fields,
            "groups": self.groups.all().iter().map(|g| g.name.clone()).collect::<Vec<_>>(),
            "group_count": self.groups.len(),
            "tickets": self.tickets.open_count(),
        })
    }
}

impl Serialize for Contact {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_envelope().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assets() -> SessionAssets {
        SessionAssets::from_json(&json!({
            "channels": [
                {
                    "uuid": "57f1078f-88aa-46f4-a59a-948a5739c03d",
                    "name": "My Android Phone",
                    "address": "+17036975131",
                    "schemes": ["tel"],
                    "roles": ["send", "receive"]
                },
                {
                    "uuid": "8e21f093-99aa-413b-b55b-758b54308fcb",
                    "name": "Twitter Channel",
                    "schemes": ["twitterid"],
                    "roles": ["send", "receive"]
                }
            ],
            "groups": [
                {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"}
            ],
            "fields": [
                {"key": "gender", "name": "Gender", "type": "text"},
                {"key": "age", "name": "Age", "type": "number"}
            ]
        }))
        .unwrap()
    }

    fn contact_json() -> Value {
        json!({
            "uuid": "5d76d86b-3bb9-4d5a-b822-c9d86f5d8e4f",
            "name": "Ryan Lewis",
            "status": "active",
            "language": "eng",
            "timezone": "America/Guayaquil",
            "urns": [
                "tel:+12065551212?channel=57f1078f-88aa-46f4-a59a-948a5739c03d&id=123",
                "twitterid:54784326227#nyaruka"
            ],
            "groups": [
                {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"},
                {"uuid": "0ec97956-c451-48a0-a180-1ce766623e31", "name": "Males"}
            ],
            "fields": {
                "gender": {"text": "Male"},
                "age": {"text": "23", "number": 23}
            },
            "created_on": "2018-06-20T11:40:30.123456789Z"
        })
    }

    #[test]
    fn test_read_drops_missing_groups() {
        let sa = assets();
        let mut missing = Vec::new();
        let contact = Contact::read(&sa, &contact_json(), &mut |r, _| missing.push(r)).unwrap();

        assert_eq!(contact.name(), "Ryan Lewis");
        assert_eq!(contact.groups().len(), 1);
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0].to_string(),
            "group[uuid=0ec97956-c451-48a0-a180-1ce766623e31,name=Males]"
        );
        assert_eq!(contact.timezone(), Some(chrono_tz::America::Guayaquil));
    }

    #[test]
    fn test_resolve_destinations() {
        let sa = assets();
        let contact = Contact::read(&sa, &contact_json(), &mut |_, _| {}).unwrap();

        let all = contact.resolve_destinations(&sa, true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].channel.name, "My Android Phone");
        assert_eq!(all[1].channel.name, "Twitter Channel");

        let first = contact.resolve_destinations(&sa, false);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_urn_mutations() {
        let sa = assets();
        let mut contact = Contact::read(&sa, &contact_json(), &mut |_, _| {}).unwrap();

        assert!(!contact.add_urn(Urn::from("tel:+12065551212")));
        assert!(contact.add_urn(Urn::from("mailto:foo@bar.com")));
        assert!(contact.remove_urn(&Urn::from("twitterid:54784326227")));
        assert_eq!(contact.urns().len(), 2);

        let twitter = sa
            .channels()
            .get(Uuid::parse_str("8e21f093-99aa-413b-b55b-758b54308fcb").unwrap())
            .unwrap();
        assert!(!contact.update_preferred_channel(&twitter));
        assert!(contact.clear_urns());
    }

    #[test]
    fn test_set_field_value() {
        let sa = assets();
        let mut contact = Contact::read(&sa, &contact_json(), &mut |_, _| {}).unwrap();

        assert!(!contact.set_field_value("gender", Some(FieldValue::text("Male"))));
        assert!(contact.set_field_value("gender", Some(FieldValue::text("Female"))));
        assert!(contact.set_field_value("gender", None));
        assert!(!contact.set_field_value("gender", None));
    }

    #[test]
    fn test_query_context() {
        let sa = assets();
        let contact = Contact::read(&sa, &contact_json(), &mut |_, _| {}).unwrap();
        let ctx = contact.query_context(&sa);
        assert_eq!(ctx["fields"]["age"], json!(23));
        assert_eq!(ctx["fields"]["gender"], json!("Male"));
        assert_eq!(ctx["urns"]["tel"], json!("+12065551212"));
        assert_eq!(ctx["status"], json!("active"));
    }
}
