//! Sending messages to the contact and broadcasts to others.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{current_locale, evaluate_message, languages, OtherContacts};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::assets::{Template, TemplateTranslation};
use crate::errors::ActionError;
use crate::events::{BroadcastCreated, Event, MsgCreated};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{
    AssetReference, BroadcastTranslation, ContactStatus, MsgContent, MsgOut, MsgTopic, QuickReply,
    TemplateReference, Templating, TemplatingComponent, TemplatingVariable, UnsendableReason,
};

// ---------------------------------------------------------------------------
// send_msg
// ---------------------------------------------------------------------------

/// Sends a message to the contact, one per destination. A template, when
/// the destination channel has a translation of it, replaces the content.
///
/// ```json
/// {
///   "type": "send_msg",
///   "uuid": "...",
///   "text": "Hi @contact.name, are you ready?",
///   "attachments": [],
///   "quick_replies": ["Yes", "No"],
///   "all_urns": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMsg {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<MsgTopic>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_urns: bool,
}

fn unsendable_reason(status: ContactStatus) -> Option<UnsendableReason> {
    match status {
        ContactStatus::Active => None,
        ContactStatus::Blocked => Some(UnsendableReason::ContactBlocked),
        ContactStatus::Stopped => Some(UnsendableReason::ContactStopped),
        ContactStatus::Archived => Some(UnsendableReason::ContactArchived),
    }
}

/// Template variables whose values are attachments rather than text.
fn is_attachment_variable(variable_type: &str) -> bool {
    matches!(variable_type, "image" | "video" | "audio" | "document")
}

/// Builds the templating for a translation and a preview of what the
/// channel will send: components substituted, buttons as quick replies.
fn template_message(
    template: &Template,
    translation: &TemplateTranslation,
    values: &[String],
) -> (Templating, MsgContent) {
    let variables: Vec<TemplatingVariable> = translation
        .variables
        .iter()
        .enumerate()
        .map(|(i, v)| TemplatingVariable {
            variable_type: v.variable_type.clone(),
            value: values.get(i).cloned().unwrap_or_default(),
        })
        .collect();

    let mut texts = Vec::new();
    let mut attachments = Vec::new();
    let mut quick_replies = Vec::new();
    for component in &translation.components {
        let mut content = component.content.clone();
        for (key, index) in &component.variables {
            let Some(variable) = variables.get(*index) else {
                content = content.replace(&format!("{{{{{key}}}}}"), "");
                continue;
            };
            if is_attachment_variable(&variable.variable_type) {
                if !variable.value.is_empty() {
                    attachments.push(variable.value.clone());
                }
                content = content.replace(&format!("{{{{{key}}}}}"), "");
            } else {
                content = content.replace(&format!("{{{{{key}}}}}"), &variable.value);
            }
        }
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        if component.component_type.starts_with("button") {
            quick_replies.push(QuickReply::new(content));
        } else {
            texts.push(content.to_string());
        }
    }

    let templating = Templating {
        template: template.reference(),
        namespace: translation.namespace.clone(),
        components: translation
            .components
            .iter()
            .map(|c| TemplatingComponent {
                component_type: c.component_type.clone(),
                name: c.name.clone(),
                variables: c.variables.clone(),
            })
            .collect(),
        variables,
    };
    let preview = MsgContent {
        text: texts.join("\n\n"),
        attachments,
        quick_replies,
    };
    (templating, preview)
}

#[async_trait]
impl Action for SendMsg {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let Some(status) = run.contact().map(|c| c.status()) else {
            return Ok(());
        };

        let languages = languages(run);
        let (content, language) = evaluate_message(
            run,
            self.base.uuid,
            &languages,
            &self.text,
            &self.attachments,
            &self.quick_replies,
            log_event,
        );
        let unsendable = unsendable_reason(status);

        let assets = run.session().assets();
        let template = self
            .template
            .as_ref()
            .and_then(|r| assets.templates().get(r.uuid));
        let template_values: Vec<String> = match &template {
            Some(_) => self
                .template_variables
                .iter()
                .map(|v| run.evaluate_template(v, log_event).0)
                .collect(),
            None => Vec::new(),
        };

        let locale = current_locale(run, language.as_deref());
        let template_locales = vec![
            run.session().merged_environment().default_locale(),
            run.session().environment().default_locale(),
        ];
        let destinations = run
            .contact()
            .map(|c| c.resolve_destinations(assets, self.all_urns))
            .unwrap_or_default();

        let mut msgs = Vec::with_capacity(destinations.len().max(1));
        for dest in &destinations {
            let channel = dest.channel.reference();
            let templated = template.as_ref().and_then(|t| {
                t.find_translation(dest.channel.uuid, &template_locales)
                    .map(|translation| (t, translation))
            });

            let msg = match templated {
                Some((t, translation)) => {
                    let (templating, preview) = template_message(t, translation, &template_values);
                    MsgOut::new(
                        Some(dest.urn.clone()),
                        Some(channel),
                        preview,
                        Some(templating),
                        translation.locale.clone(),
                        unsendable,
                    )
                }
                None => MsgOut::new(
                    Some(dest.urn.clone()),
                    Some(channel),
                    content.clone(),
                    None,
                    locale.clone(),
                    unsendable,
                ),
            };
            msgs.push(msg);
        }

        // without a destination the msg is still created and it's up to the
        // caller what to do with it
        if destinations.is_empty() {
            msgs.push(MsgOut::new(
                None,
                None,
                content,
                None,
                locale,
                Some(UnsendableReason::NoDestination),
            ));
        }

        for mut msg in msgs {
            msg.topic = self.topic;
            log_event(Event::new(MsgCreated { msg }));
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        if let Some(template) = &self.template {
            dependency(AssetReference::Template(template.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// send_broadcast
// ---------------------------------------------------------------------------

/// Sends a message to other contacts. The message is evaluated in every
/// allowed language and the caller picks the translation per recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendBroadcast {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(flatten)]
    pub recipients: OtherContacts,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
}

#[async_trait]
impl Action for SendBroadcast {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let recipients = self.recipients.resolve(run, log_event);

        if run.session().batch_start()
            && (!recipients.groups.is_empty() || !recipients.contact_query.is_empty())
        {
            log_event(Event::error("can't send broadcasts during batch starts"));
            return Ok(());
        }

        let env = run.session().environment();
        let base_language = env.default_language().unwrap_or("und").to_string();
        let mut all_languages = vec![base_language.clone()];
        all_languages.extend(
            env.allowed_languages
                .iter()
                .filter(|l| **l != base_language)
                .cloned(),
        );

        let mut translations = BTreeMap::new();
        for language in &all_languages {
            let preferred = vec![language.clone(), base_language.clone()];
            let (content, _) = evaluate_message(
                run,
                self.base.uuid,
                &preferred,
                &self.text,
                &self.attachments,
                &self.quick_replies,
                log_event,
            );
            translations.insert(
                language.clone(),
                BroadcastTranslation {
                    text: content.text,
                    attachments: content.attachments,
                    quick_replies: content.quick_replies,
                },
            );
        }

        if recipients.is_empty() {
            return Ok(());
        }

        log_event(Event::new(BroadcastCreated {
            translations,
            base_language,
            groups: recipients.groups,
            contacts: recipients.contacts,
            contact_query: recipients.contact_query,
            urns: recipients.urns,
        }));
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        self.recipients.inspect(dependency);
    }
}
