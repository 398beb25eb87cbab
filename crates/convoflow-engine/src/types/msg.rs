//! Messages created by actions and received as input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reference::{ChannelReference, TemplateReference};
use super::urn::Urn;

pub const MAX_ATTACHMENT_LENGTH: usize = 2048;
pub const MAX_QUICK_REPLY_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

impl QuickReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: String::new(),
        }
    }
}

/// Why a created message can't be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsendableReason {
    NoDestination,
    ContactBlocked,
    ContactStopped,
    ContactArchived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgTopic {
    Event,
    Account,
    Purchase,
    Agent,
}

/// Text, attachments and quick replies of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgContent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
}

impl MsgContent {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.attachments.is_empty() && self.quick_replies.is_empty()
    }
}

/// A component of a template, with evaluated parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatingComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatingVariable {
    #[serde(rename = "type")]
    pub variable_type: String,
    pub value: String,
}

/// How a templated message should be sent by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templating {
    pub template: TemplateReference,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<TemplatingComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<TemplatingVariable>,
}

/// An outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgOut {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelReference>,
    #[serde(flatten)]
    pub content: MsgContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templating: Option<Templating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<MsgTopic>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsendable_reason: Option<UnsendableReason>,
}

impl MsgOut {
    pub fn new(
        urn: Option<Urn>,
        channel: Option<ChannelReference>,
        content: MsgContent,
        templating: Option<Templating>,
        locale: String,
        unsendable_reason: Option<UnsendableReason>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            urn,
            channel,
            content,
            templating,
            topic: None,
            locale,
            unsendable_reason,
        }
    }
}

/// An incoming message which started or resumed the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgIn {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelReference>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// One language's content of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTranslation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
}

/// Whether an evaluated attachment is `content-type:url` with a sane
/// content type, or a geo attachment.
pub fn is_valid_attachment(attachment: &str) -> bool {
    let Some((content_type, url)) = attachment.split_once(':') else {
        return false;
    };
    if content_type == "geo" {
        return !url.is_empty();
    }
    let has_type = !content_type.is_empty()
        && content_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '.' | '+'));
    has_type && (url.starts_with("http://") || url.starts_with("https://"))
}
