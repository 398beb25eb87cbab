//! Actions which change the contact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{apply_modifier, evaluate_trimmed};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::Event;
use crate::modifiers::{Modifier, UrnModification};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{
    is_known_scheme, is_valid_language, parse_timezone, AssetReference, ChannelReference,
    ContactStatus, FieldReference, Urn,
};

/// Evaluates a language template, logging an error if it isn't a valid
/// language. Empty clears the language.
fn evaluate_language(
    run: &dyn Run,
    template: &str,
    log: &mut EventCallback<'_>,
) -> Option<Option<String>> {
    let language = evaluate_trimmed(run, template, log);
    if language.is_empty() {
        return Some(None);
    }
    if !is_valid_language(&language) {
        log(Event::error(format!("'{language}' is not a valid language")));
        return None;
    }
    Some(Some(language))
}

/// Evaluates a timezone template into a timezone modifier.
fn evaluate_timezone(
    run: &dyn Run,
    template: &str,
    log: &mut EventCallback<'_>,
) -> Option<Modifier> {
    let timezone = evaluate_trimmed(run, template, log);
    if timezone.is_empty() {
        return Some(Modifier::Timezone { timezone: None });
    }
    match parse_timezone(&timezone) {
        Some(tz) => Some(Modifier::Timezone { timezone: Some(tz) }),
        None => {
            log(Event::error(format!("unrecognized timezone: '{timezone}'")));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// set_contact_name
// ---------------------------------------------------------------------------

/// Sets the contact's name.
///
/// ```json
/// {"type": "set_contact_name", "uuid": "...", "name": "Bob Smith"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactName {
    #[serde(flatten)]
    pub base: ActionBase,
    pub name: String,
}

#[async_trait]
impl Action for SetContactName {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        let name = evaluate_trimmed(run, &self.name, log_event);
        apply_modifier(run, Modifier::Name { name }, log_modifier, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// set_contact_language
// ---------------------------------------------------------------------------

/// Sets the contact's language. An empty language clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactLanguage {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default)]
    pub language: String,
}

#[async_trait]
impl Action for SetContactLanguage {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        if let Some(language) = evaluate_language(run, &self.language, log_event) {
            apply_modifier(run, Modifier::Language { language }, log_modifier, log_event);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// set_contact_timezone
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactTimezone {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default)]
    pub timezone: String,
}

#[async_trait]
impl Action for SetContactTimezone {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        if let Some(modifier) = evaluate_timezone(run, &self.timezone, log_event) {
            apply_modifier(run, modifier, log_modifier, log_event);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// set_contact_status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactStatus {
    #[serde(flatten)]
    pub base: ActionBase,
    pub status: ContactStatus,
}

#[async_trait]
impl Action for SetContactStatus {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        let modifier = Modifier::Status {
            status: self.status,
        };
        apply_modifier(run, modifier, log_modifier, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// set_contact_channel
// ---------------------------------------------------------------------------

/// Makes a channel the contact's preferred channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactChannel {
    #[serde(flatten)]
    pub base: ActionBase,
    pub channel: ChannelReference,
}

#[async_trait]
impl Action for SetContactChannel {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        let Some(channel) = run.session().assets().channels().get(self.channel.uuid) else {
            log_event(Event::dependency_error(&AssetReference::Channel(
                self.channel.clone(),
            )));
            return Ok(());
        };
        apply_modifier(run, Modifier::Channel { channel }, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Channel(self.channel.clone()));
    }
}

// ---------------------------------------------------------------------------
// set_contact_field
// ---------------------------------------------------------------------------

/// Sets a contact field from evaluated text. Empty text clears it.
///
/// ```json
/// {"type": "set_contact_field", "uuid": "...", "field": {"key": "gender", "name": "Gender"}, "value": "Male"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetContactField {
    #[serde(flatten)]
    pub base: ActionBase,
    pub field: FieldReference,
    #[serde(default)]
    pub value: String,
}

#[async_trait]
impl Action for SetContactField {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }
        let Some(field) = run.session().assets().fields().get_by_key(&self.field.key) else {
            log_event(Event::dependency_error(&AssetReference::Field(
                self.field.clone(),
            )));
            return Ok(());
        };
        let (value, _) = run.evaluate_template(&self.value, log_event);
        apply_modifier(run, Modifier::Field { field, value }, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Field(self.field.clone()));
    }
}

// ---------------------------------------------------------------------------
// add_contact_urn
// ---------------------------------------------------------------------------

/// Adds a URN built from a scheme and an evaluated path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContactUrn {
    #[serde(flatten)]
    pub base: ActionBase,
    pub scheme: String,
    pub path: String,
}

#[async_trait]
impl Action for AddContactUrn {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if !is_known_scheme(&self.scheme) {
            return Err(ReadError::validation(format!(
                "'{}' is not a valid URN scheme",
                self.scheme
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }

        let path = evaluate_trimmed(run, &self.path, log_event);
        if path.is_empty() {
            log_event(Event::error("can't add URN with empty path"));
            return Ok(());
        }

        let urn = match Urn::new(&self.scheme, &path) {
            Ok(urn) => urn.normalize(),
            Err(e) => {
                log_event(Event::error(format!("unable to add URN '{}:{path}': {e}", self.scheme)));
                return Ok(());
            }
        };

        let modifier = Modifier::Urn {
            urn,
            modification: UrnModification::Append,
        };
        apply_modifier(run, modifier, log_modifier, log_event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// update_contact
// ---------------------------------------------------------------------------

/// Legacy action which sets several contact attributes at once. Each
/// attribute present becomes its own modifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContact {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContactStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[async_trait]
impl Action for UpdateContact {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if self.name.is_none()
            && self.language.is_none()
            && self.status.is_none()
            && self.timezone.is_none()
        {
            return Err(ReadError::validation(
                "must specify at least one contact attribute to update",
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }

        let mut modifiers = Vec::new();
        if let Some(name) = &self.name {
            modifiers.push(Modifier::Name {
                name: evaluate_trimmed(run, name, log_event),
            });
        }
        if let Some(language) = &self.language {
            if let Some(language) = evaluate_language(run, language, log_event) {
                modifiers.push(Modifier::Language { language });
            }
        }
        if let Some(status) = self.status {
            modifiers.push(Modifier::Status { status });
        }
        if let Some(timezone) = &self.timezone {
            modifiers.extend(evaluate_timezone(run, timezone, log_event));
        }

        for modifier in modifiers {
            apply_modifier(run, modifier, log_modifier, log_event);
        }
        Ok(())
    }
}
