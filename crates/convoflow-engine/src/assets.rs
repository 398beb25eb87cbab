//! Session assets: the groups, fields, channels and other org-level objects
//! that actions, events and modifiers reference.
//!
//! Each asset type lives in an [`AssetSet`], a small registry behind a
//! `parking_lot::RwLock` so that name-matched groups and labels can be
//! created on the fly while the set is shared by `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ReadError;
use crate::types::{
    AssetReference, ChannelReference, ClassifierReference, FieldReference, FieldType,
    FlowReference, GroupReference, LabelReference, LlmReference, OptInReference,
    TemplateReference, TopicReference, UserReference,
};

/// An asset addressable by UUID and display name.
pub trait NamedAsset: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> &str;
}

macro_rules! named_asset {
    ($ty:ty) => {
        impl NamedAsset for $ty {
            fn uuid(&self) -> Uuid {
                self.uuid
            }
            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Asset types
// ---------------------------------------------------------------------------

/// A contact group. Groups with a query are dynamic: membership is computed
/// and never changed directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Group {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            query: None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
    }

    pub fn reference(&self) -> GroupReference {
        GroupReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Group);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub uuid: Uuid,
    pub name: String,
}

impl Label {
    pub fn reference(&self) -> LabelReference {
        LabelReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Label);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub uuid: Uuid,
    pub key: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: FieldType,
}

impl Field {
    pub fn reference(&self) -> FieldReference {
        FieldReference::new(self.key.clone(), self.name.clone())
    }
}

named_asset!(Field);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Send,
    Receive,
    Call,
    Answer,
    Ussd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub roles: Vec<ChannelRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl Channel {
    pub fn reference(&self) -> ChannelReference {
        ChannelReference::new(self.uuid, self.name.clone())
    }

    pub fn has_role(&self, role: ChannelRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s == scheme)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

named_asset!(Channel);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub classifier_type: String,
    #[serde(default)]
    pub intents: Vec<String>,
}

impl Classifier {
    pub fn reference(&self) -> ClassifierReference {
        ClassifierReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Classifier);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Llm {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub llm_type: String,
    #[serde(default)]
    pub model: String,
}

impl Llm {
    pub fn reference(&self) -> LlmReference {
        LlmReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Llm);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub uuid: Uuid,
    pub name: String,
}

impl Topic {
    pub fn reference(&self) -> TopicReference {
        TopicReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Topic);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub email: String,
    pub name: String,
}

impl User {
    pub fn reference(&self) -> UserReference {
        UserReference::new(self.email.clone(), self.name.clone())
    }
}

named_asset!(User);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptIn {
    pub uuid: Uuid,
    pub name: String,
}

impl OptIn {
    pub fn reference(&self) -> OptInReference {
        OptInReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(OptIn);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    Messaging,
    MessagingBackground,
    MessagingOffline,
    Voice,
}

impl FlowType {
    /// Whether a run of this type can enter a flow of type `child`.
    pub fn can_enter(self, child: FlowType) -> bool {
        match (self, child) {
            (FlowType::Voice, FlowType::Voice) => true,
            (FlowType::Voice, _) | (_, FlowType::Voice) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub flow_type: FlowType,
}

impl Flow {
    pub fn reference(&self) -> FlowReference {
        FlowReference::new(self.uuid, self.name.clone())
    }
}

named_asset!(Flow);

/// A named webhook fan-out point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resthook {
    pub slug: String,
    #[serde(default)]
    pub subscribers: Vec<String>,
}

/// A component of a template translation, e.g. a body with `{{1}}` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Placeholder name to index into the translation's variables.
    #[serde(default)]
    pub variables: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    #[serde(rename = "type")]
    pub variable_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTranslation {
    pub channel: ChannelReference,
    pub locale: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub translations: Vec<TemplateTranslation>,
}

impl Template {
    pub fn reference(&self) -> TemplateReference {
        TemplateReference::new(self.uuid, self.name.clone())
    }

    /// Finds the translation for a channel, preferring the first locale
    /// that matches exactly, then one matching by language alone.
    pub fn find_translation(&self, channel: Uuid, locales: &[String]) -> Option<&TemplateTranslation> {
        let candidates: Vec<&TemplateTranslation> = self
            .translations
            .iter()
            .filter(|t| t.channel.uuid == channel)
            .collect();

        for locale in locales.iter().filter(|l| !l.is_empty()) {
            if let Some(t) = candidates.iter().copied().find(|t| &t.locale == locale) {
                return Some(t);
            }
        }
        for locale in locales.iter().filter(|l| !l.is_empty()) {
            let lang = locale.split('-').next().unwrap_or_default();
            if let Some(t) = candidates
                .iter()
                .copied()
                .find(|t| t.locale.split('-').next() == Some(lang))
            {
                return Some(t);
            }
        }
        None
    }
}

named_asset!(Template);

// ---------------------------------------------------------------------------
// AssetSet
// ---------------------------------------------------------------------------

/// A shared, lookup-by-UUID-or-name collection of one asset type.
pub struct AssetSet<T> {
    items: RwLock<Vec<Arc<T>>>,
}

impl<T: NamedAsset> AssetSet<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn get(&self, uuid: Uuid) -> Option<Arc<T>> {
        self.items.read().iter().find(|a| a.uuid() == uuid).cloned()
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<T>> {
        let name = name.trim().to_lowercase();
        self.items
            .read()
            .iter()
            .find(|a| a.name().to_lowercase() == name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the asset with this name, creating it with `make` if there
    /// is none.
    pub fn find_or_create(&self, name: &str, make: impl FnOnce() -> T) -> Arc<T> {
        if let Some(existing) = self.find_by_name(name) {
            return existing;
        }
        let mut items = self.items.write();
        let lowered = name.trim().to_lowercase();
        if let Some(existing) = items.iter().find(|a| a.name().to_lowercase() == lowered) {
            return Arc::clone(existing);
        }
        let created = Arc::new(make());
        items.push(Arc::clone(&created));
        created
    }
}

impl<T: NamedAsset> Default for AssetSet<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> std::fmt::Debug for AssetSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetSet")
            .field("len", &self.items.read().len())
            .finish()
    }
}

impl AssetSet<Field> {
    pub fn get_by_key(&self, key: &str) -> Option<Arc<Field>> {
        self.items.read().iter().find(|f| f.key == key).cloned()
    }
}

impl AssetSet<User> {
    pub fn find_by_email(&self, email: &str) -> Option<Arc<User>> {
        let email = email.trim().to_lowercase();
        self.items
            .read()
            .iter()
            .find(|u| u.email.to_lowercase() == email)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// SessionAssets
// ---------------------------------------------------------------------------

/// JSON source of session assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSource {
    pub channels: Vec<Channel>,
    pub classifiers: Vec<Classifier>,
    pub fields: Vec<Field>,
    pub flows: Vec<Flow>,
    pub groups: Vec<Group>,
    pub labels: Vec<Label>,
    pub llms: Vec<Llm>,
    pub optins: Vec<OptIn>,
    pub resthooks: Vec<Resthook>,
    pub templates: Vec<Template>,
    pub topics: Vec<Topic>,
    pub users: Vec<User>,
}

/// All the assets available to a session.
#[derive(Debug, Default)]
pub struct SessionAssets {
    channels: AssetSet<Channel>,
    classifiers: AssetSet<Classifier>,
    fields: AssetSet<Field>,
    flows: AssetSet<Flow>,
    groups: AssetSet<Group>,
    labels: AssetSet<Label>,
    llms: AssetSet<Llm>,
    optins: AssetSet<OptIn>,
    resthooks: Vec<Resthook>,
    templates: AssetSet<Template>,
    topics: AssetSet<Topic>,
    users: AssetSet<User>,
}

impl SessionAssets {
    pub fn new(source: AssetsSource) -> Self {
        Self {
            channels: AssetSet::new(source.channels),
            classifiers: AssetSet::new(source.classifiers),
            fields: AssetSet::new(source.fields),
            flows: AssetSet::new(source.flows),
            groups: AssetSet::new(source.groups),
            labels: AssetSet::new(source.labels),
            llms: AssetSet::new(source.llms),
            optins: AssetSet::new(source.optins),
            resthooks: source.resthooks,
            templates: AssetSet::new(source.templates),
            topics: AssetSet::new(source.topics),
            users: AssetSet::new(source.users),
        }
    }

    pub fn from_json(data: &serde_json::Value) -> Result<Self, ReadError> {
        let source: AssetsSource =
            serde_json::from_value(data.clone()).map_err(|e| ReadError::Decode {
                message: format!("unable to read assets: {e}"),
            })?;
        Ok(Self::new(source))
    }

    pub fn channels(&self) -> &AssetSet<Channel> {
        &self.channels
    }

    pub fn classifiers(&self) -> &AssetSet<Classifier> {
        &self.classifiers
    }

    pub fn fields(&self) -> &AssetSet<Field> {
        &self.fields
    }

    pub fn flows(&self) -> &AssetSet<Flow> {
        &self.flows
    }

    pub fn groups(&self) -> &AssetSet<Group> {
        &self.groups
    }

    pub fn labels(&self) -> &AssetSet<Label> {
        &self.labels
    }

    pub fn llms(&self) -> &AssetSet<Llm> {
        &self.llms
    }

    pub fn optins(&self) -> &AssetSet<OptIn> {
        &self.optins
    }

    pub fn templates(&self) -> &AssetSet<Template> {
        &self.templates
    }

    pub fn topics(&self) -> &AssetSet<Topic> {
        &self.topics
    }

    pub fn users(&self) -> &AssetSet<User> {
        &self.users
    }

    pub fn resthook(&self, slug: &str) -> Option<&Resthook> {
        self.resthooks.iter().find(|r| r.slug == slug)
    }

    /// Whether a (non-variable) reference resolves to an existing asset.
    /// Variable references and contacts are always considered resolvable.
    pub fn contains(&self, reference: &AssetReference) -> bool {
        match reference {
            AssetReference::Channel(r) => self.channels.get(r.uuid).is_some(),
            AssetReference::Classifier(r) => self.classifiers.get(r.uuid).is_some(),
            AssetReference::Contact(_) => true,
            AssetReference::Field(r) => self.fields.get_by_key(&r.key).is_some(),
            AssetReference::Flow(r) => self.flows.get(r.uuid).is_some(),
            AssetReference::Group(r) => r.uuid().map_or(true, |u| self.groups.get(u).is_some()),
            AssetReference::Label(LabelReference::Fixed { uuid, .. }) => {
                self.labels.get(*uuid).is_some()
            }
            AssetReference::Label(LabelReference::Variable { .. }) => true,
            AssetReference::Llm(r) => self.llms.get(r.uuid).is_some(),
            AssetReference::OptIn(r) => self.optins.get(r.uuid).is_some(),
            AssetReference::Resthook(_) => true,
            AssetReference::Template(r) => self.templates.get(r.uuid).is_some(),
            AssetReference::Topic(r) => self.topics.get(r.uuid).is_some(),
            AssetReference::User(r) => r
                .email()
                .map_or(true, |e| self.users.find_by_email(e).is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assets() -> SessionAssets {
        SessionAssets::from_json(&json!({
            "groups": [
                {"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"},
                {"uuid": "1e1ce1e1-9288-4504-869e-022d1003c72a", "name": "Customers", "query": "tickets > 0"}
            ],
            "fields": [
                {"uuid": "d66a7823-eada-40e5-9a3a-57239d4690bf", "key": "age", "name": "Age", "type": "number"}
            ],
            "users": [
                {"uuid": "0c78ef47-7d56-44d8-8f57-96e0f30e8f44", "email": "bob@nyaruka.com", "name": "Bob"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_lookups() {
        let sa = assets();
        let testers = sa.groups().find_by_name("testers").unwrap();
        assert!(!testers.is_dynamic());
        assert!(sa.groups().find_by_name("Customers").unwrap().is_dynamic());
        assert_eq!(sa.fields().get_by_key("age").unwrap().value_type, FieldType::Number);
        assert!(sa.users().find_by_email("BOB@nyaruka.com").is_some());
        assert!(sa.resthook("new-registration").is_none());
    }

    #[test]
    fn test_find_or_create() {
        let sa = assets();
        let existing = sa
            .groups()
            .find_or_create("TESTERS", || Group::new(Uuid::new_v4(), "TESTERS"));
        assert_eq!(existing.name, "Testers");

        let created = sa
            .groups()
            .find_or_create("Reporters", || Group::new(Uuid::new_v4(), "Reporters"));
        assert_eq!(sa.groups().len(), 3);
        assert_eq!(sa.groups().get(created.uuid).unwrap().name, "Reporters");
    }

    #[test]
    fn test_contains() {
        let sa = assets();
        assert!(sa.contains(&AssetReference::Field(FieldReference::new("age", "Age"))));
        assert!(!sa.contains(&AssetReference::Field(FieldReference::new("height", "Height"))));
        assert!(sa.contains(&AssetReference::Group(GroupReference::variable("@fields.x"))));
    }

    #[test]
    fn test_template_find_translation() {
        let channel = Uuid::new_v4();
        let template: Template = serde_json::from_value(json!({
            "uuid": "5722e1fd-fe32-4e74-ac78-3cf41a6adb7e",
            "name": "affirmation",
            "translations": [
                {"channel": {"uuid": channel, "name": "WhatsApp"}, "locale": "eng-US", "components": []},
                {"channel": {"uuid": channel, "name": "WhatsApp"}, "locale": "spa", "components": []}
            ]
        }))
        .unwrap();

        let t = template.find_translation(channel, &["eng-US".into()]).unwrap();
        assert_eq!(t.locale, "eng-US");
        let t = template.find_translation(channel, &["spa-EC".into()]).unwrap();
        assert_eq!(t.locale, "spa");
        assert!(template.find_translation(channel, &["fra".into()]).is_none());
        assert!(template.find_translation(Uuid::new_v4(), &["eng-US".into()]).is_none());
    }
}
