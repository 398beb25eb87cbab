//! Events describing changes to the session contact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::Group;
use crate::types::{ContactEnvelope, ContactStatus, FieldReference, FieldValue, GroupReference, Urn};

/// `contact_name_changed`: the contact's name was changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactNameChanged {
    pub name: String,
}

/// `contact_language_changed`: empty when the language was cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactLanguageChanged {
    #[serde(default)]
    pub language: String,
}

/// `contact_timezone_changed`: empty when the timezone was cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTimezoneChanged {
    #[serde(default)]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStatusChanged {
    pub status: ContactStatus,
}

/// `contact_field_changed`: a `null` value means the field was cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactFieldChanged {
    pub field: FieldReference,
    pub value: Option<FieldValue>,
}

/// `contact_groups_changed`: one event for all groups joined and left by a
/// single change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactGroupsChanged {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups_added: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups_removed: Vec<GroupReference>,
}

impl ContactGroupsChanged {
    pub fn new(added: &[std::sync::Arc<Group>], removed: &[std::sync::Arc<Group>]) -> Self {
        Self {
            groups_added: added.iter().map(|g| g.reference()).collect(),
            groups_removed: removed.iter().map(|g| g.reference()).collect(),
        }
    }
}

/// `contact_urns_changed`: the complete new list of URNs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactUrnsChanged {
    pub urns: Vec<Urn>,
}

/// `contact_refreshed`: the whole contact, as the caller now sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRefreshed {
    pub contact: ContactEnvelope,
}

/// `contact_created`: a contact was created for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactCreated {
    pub contact: ContactEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactLastSeenOnChanged {
    pub last_seen_on: DateTime<Utc>,
}
