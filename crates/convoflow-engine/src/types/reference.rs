//! Lightweight references to assets.
//!
//! A reference either names an asset by stable identity (UUID plus display
//! name) or, for groups, labels and users, carries an expression which is
//! evaluated at execution time and matched against asset names.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_reference {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            pub uuid: Uuid,
            #[serde(default)]
            pub name: String,
        }

        impl $name {
            pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
                Self {
                    uuid,
                    name: name.into(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}[uuid={},name={}]", $kind, self.uuid, self.name)
            }
        }
    };
}

uuid_reference!(
    /// Reference to a channel.
    ChannelReference,
    "channel"
);
uuid_reference!(
    /// Reference to a classifier.
    ClassifierReference,
    "classifier"
);
uuid_reference!(
    /// Reference to another contact (used by session/broadcast actions).
    ContactReference,
    "contact"
);
uuid_reference!(
    /// Reference to a flow.
    FlowReference,
    "flow"
);
uuid_reference!(LlmReference, "llm");
uuid_reference!(OptInReference, "optin");
uuid_reference!(TemplateReference, "template");
uuid_reference!(TopicReference, "topic");

/// Reference to a contact field, keyed by its snake_case key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

impl FieldReference {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field[key={},name={}]", self.key, self.name)
    }
}

/// Reference to a group, either fixed or resolved by evaluated name.
///
/// ```json
/// {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"}
/// {"name_match": "@(format_location(contact.fields.state)) Members"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupReference {
    Fixed { uuid: Uuid, name: String },
    Variable { name_match: String },
}

impl GroupReference {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self::Fixed {
            uuid,
            name: name.into(),
        }
    }

    pub fn variable(name_match: impl Into<String>) -> Self {
        Self::Variable {
            name_match: name_match.into(),
        }
    }

    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            Self::Fixed { uuid, .. } => Some(*uuid),
            Self::Variable { .. } => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }
}

impl fmt::Display for GroupReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { uuid, name } => write!(f, "group[uuid={uuid},name={name}]"),
            Self::Variable { name_match } => write!(f, "group[name_match={name_match}]"),
        }
    }
}

/// Reference to a message label, either fixed or resolved by evaluated name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelReference {
    Fixed { uuid: Uuid, name: String },
    Variable { name_match: String },
}

impl LabelReference {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self::Fixed {
            uuid,
            name: name.into(),
        }
    }

    pub fn variable(name_match: impl Into<String>) -> Self {
        Self::Variable {
            name_match: name_match.into(),
        }
    }
}

impl fmt::Display for LabelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { uuid, name } => write!(f, "label[uuid={uuid},name={name}]"),
            Self::Variable { name_match } => write!(f, "label[name_match={name_match}]"),
        }
    }
}

/// Reference to a user (ticket assignee), by email or evaluated email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserReference {
    Fixed {
        email: String,
        #[serde(default)]
        name: String,
    },
    Variable {
        email_match: String,
    },
}

impl UserReference {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Fixed {
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Fixed { email, .. } => Some(email),
            Self::Variable { .. } => None,
        }
    }
}

impl fmt::Display for UserReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { email, name } => write!(f, "user[email={email},name={name}]"),
            Self::Variable { email_match } => write!(f, "user[email_match={email_match}]"),
        }
    }
}

/// Any asset reference, as reported to dependency callbacks and carried by
/// dependency error events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AssetReference {
    Channel(ChannelReference),
    Classifier(ClassifierReference),
    Contact(ContactReference),
    Field(FieldReference),
    Flow(FlowReference),
    Group(GroupReference),
    Label(LabelReference),
    Llm(LlmReference),
    OptIn(OptInReference),
    Resthook(String),
    Template(TemplateReference),
    Topic(TopicReference),
    User(UserReference),
}

impl AssetReference {
    /// The asset type name, e.g. `"group"`.
    pub fn asset_type(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Classifier(_) => "classifier",
            Self::Contact(_) => "contact",
            Self::Field(_) => "field",
            Self::Flow(_) => "flow",
            Self::Group(_) => "group",
            Self::Label(_) => "label",
            Self::Llm(_) => "llm",
            Self::OptIn(_) => "optin",
            Self::Resthook(_) => "resthook",
            Self::Template(_) => "template",
            Self::Topic(_) => "topic",
            Self::User(_) => "user",
        }
    }

    /// Variable references have nothing to look up until execution.
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            Self::Group(GroupReference::Variable { .. })
                | Self::Label(LabelReference::Variable { .. })
                | Self::User(UserReference::Variable { .. })
        )
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(r) => r.fmt(f),
            Self::Classifier(r) => r.fmt(f),
            Self::Contact(r) => r.fmt(f),
            Self::Field(r) => r.fmt(f),
            Self::Flow(r) => r.fmt(f),
            Self::Group(r) => r.fmt(f),
            Self::Label(r) => r.fmt(f),
            Self::Llm(r) => r.fmt(f),
            Self::OptIn(r) => r.fmt(f),
            Self::Resthook(slug) => write!(f, "resthook[slug={slug}]"),
            Self::Template(r) => r.fmt(f),
            Self::Topic(r) => r.fmt(f),
            Self::User(r) => r.fmt(f),
        }
    }
}

macro_rules! into_asset_reference {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AssetReference {
                fn from(r: $ty) -> Self {
                    Self::$variant(r)
                }
            }

            impl From<&$ty> for AssetReference {
                fn from(r: &$ty) -> Self {
                    Self::$variant(r.clone())
                }
            }
        )*
    };
}

into_asset_reference!(
    ChannelReference => Channel,
    ClassifierReference => Classifier,
    ContactReference => Contact,
    FieldReference => Field,
    FlowReference => Flow,
    GroupReference => Group,
    LabelReference => Label,
    LlmReference => Llm,
    OptInReference => OptIn,
    TemplateReference => Template,
    TopicReference => Topic,
    UserReference => User,
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_reference_display() {
        let r = FieldReference::new("age", "Age");
        assert_eq!(r.to_string(), "field[key=age,name=Age]");
        assert_eq!(
            AssetReference::from(r).to_string(),
            "field[key=age,name=Age]"
        );
    }

    #[test]
    fn test_group_reference_forms() {
        let fixed: GroupReference = serde_json::from_value(json!({
            "uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d",
            "name": "Testers"
        }))
        .unwrap();
        assert!(!fixed.is_variable());
        assert_eq!(
            fixed.uuid().unwrap().to_string(),
            "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d"
        );

        let variable: GroupReference =
            serde_json::from_value(json!({"name_match": "@contact.fields.state Members"}))
                .unwrap();
        assert!(variable.is_variable());
        assert_eq!(
            serde_json::to_value(&variable).unwrap(),
            json!({"name_match": "@contact.fields.state Members"})
        );
    }

    #[test]
    fn test_user_reference_forms() {
        let fixed: UserReference =
            serde_json::from_value(json!({"email": "bob@nyaruka.com", "name": "Bob"})).unwrap();
        assert_eq!(fixed.email(), Some("bob@nyaruka.com"));
        assert_eq!(fixed.to_string(), "user[email=bob@nyaruka.com,name=Bob]");

        let variable: UserReference =
            serde_json::from_value(json!({"email_match": "@fields.supervisor"})).unwrap();
        assert!(AssetReference::from(variable).is_variable());
    }
}
