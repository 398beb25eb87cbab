//! Message, call and wait events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::Call;
use crate::types::{
    BroadcastTranslation, ChannelReference, ContactReference, GroupReference, LabelReference,
    MsgIn, MsgOut, OptInReference, Urn,
};

/// `msg_created`: an outgoing message, one per destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgCreated {
    pub msg: MsgOut,
}

/// `msg_received`: the caller received a message from the contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgReceived {
    pub msg: MsgIn,
}

/// What kind of input a wait expects, so channels can adapt their UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hint {
    Image,
    Audio,
    Video,
    Location,
    Digits {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminated_by: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWait {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<Hint>,
}

/// `ivr_created`: a message to be spoken or played on a voice call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvrCreated {
    pub msg: MsgOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastCreated {
    pub translations: BTreeMap<String, BroadcastTranslation>,
    pub base_language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<ContactReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contact_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urns: Vec<Urn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInRequested {
    pub optin: OptInReference,
    pub channel: ChannelReference,
    pub urn: Urn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInStarted {
    pub optin: OptInReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInStopped {
    pub optin: OptInReference,
}

/// `input_labels_added`: labels applied to the message which resumed the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLabelsAdded {
    pub input_uuid: Uuid,
    pub labels: Vec<LabelReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStarted {
    pub channel: ChannelReference,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// `dial_wait`: the session is waiting for the caller to dial a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialWait {
    pub urn: Urn,
    pub dial_limit_seconds: u32,
    pub call_limit_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialStatus {
    Answered,
    NoAnswer,
    Busy,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dial {
    pub status: DialStatus,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialEnded {
    pub dial: Dial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCreated {
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceived {
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMissed {
    pub channel: ChannelReference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitTimedOut {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitExpired {}
