//! Helpers shared by action implementations.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assets::{Group, Label, User};
use crate::errors::ReadError;
use crate::events::{Event, RunEnded, RunResultChanged};
use crate::modifiers::{self, Modifier};
use crate::run::{EventCallback, ModifierCallback, Run, RunStatus, Step};
use crate::types::{
    is_valid_attachment, is_valid_result_name, locale, parse_phone_number, truncate_chars, truncate_ellipsis,
    AssetReference, CallStatus, ContactReference, GroupReference, LabelReference, MsgContent,
    QuickReply, RunResult, Urn, UserReference, WebhookCall, CATEGORY_FAILURE, CATEGORY_SUCCESS,
    MAX_ATTACHMENT_LENGTH, MAX_QUICK_REPLY_LENGTH, RESULT_EXTRA_MAX_BYTES,
};

/// Categories of results saved from webhook calls.
pub const WEBHOOK_CATEGORIES: &[&str] = &[CATEGORY_SUCCESS, CATEGORY_FAILURE];

pub(crate) fn webhook_category(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Success => CATEGORY_SUCCESS,
        CallStatus::ResponseError | CallStatus::ConnectionError => CATEGORY_FAILURE,
    }
}

/// An optional result name must be valid when given.
pub(crate) fn validate_result_name(name: &str) -> Result<(), ReadError> {
    if !name.is_empty() && !is_valid_result_name(name) {
        return Err(ReadError::validation(format!(
            "'{name}' is not a valid result name"
        )));
    }
    Ok(())
}

/// Evaluates a template and trims the result.
pub(crate) fn evaluate_trimmed(run: &dyn Run, template: &str, log: &mut EventCallback<'_>) -> String {
    let (value, _) = run.evaluate_template(template, log);
    value.trim().to_string()
}

/// Languages to localize into: the contact's language if allowed, then the
/// rest of the environment's languages.
pub(crate) fn languages(run: &dyn Run) -> Vec<String> {
    run.session().merged_environment().allowed_languages
}

/// Locale of content in `language`, using the environment's country.
pub(crate) fn current_locale(run: &dyn Run, language: Option<&str>) -> String {
    let env = run.session().merged_environment();
    locale(language, env.default_country.as_deref())
}

/// Localizes and evaluates message text, attachments and quick replies.
/// Returns the content and the language the author wrote it in, if any.
pub(crate) fn evaluate_message(
    run: &dyn Run,
    item: Uuid,
    languages: &[String],
    text: &str,
    attachments: &[String],
    quick_replies: &[String],
    log: &mut EventCallback<'_>,
) -> (MsgContent, Option<String>) {
    let (localized_text, text_lang) =
        run.get_text_array(item, "text", &[text.to_string()], languages);
    let localized_text = localized_text.into_iter().next().unwrap_or_default();
    let (evaluated_text, _) = run.evaluate_template(&localized_text, log);

    let (localized_attachments, attachments_lang) =
        run.get_text_array(item, "attachments", attachments, languages);
    let mut evaluated_attachments = Vec::with_capacity(localized_attachments.len());
    for attachment in &localized_attachments {
        let evaluated = evaluate_trimmed(run, attachment, log);
        if !is_valid_attachment(&evaluated) {
            log(Event::error("attachment evaluated to invalid value, skipping"));
            continue;
        }
        if evaluated.len() > MAX_ATTACHMENT_LENGTH {
            log(Event::error(format!(
                "evaluated attachment is longer than {MAX_ATTACHMENT_LENGTH} limit, skipping"
            )));
            continue;
        }
        evaluated_attachments.push(evaluated);
    }

    let (localized_quick_replies, quick_replies_lang) =
        run.get_text_array(item, "quick_replies", quick_replies, languages);
    let mut evaluated_quick_replies = Vec::with_capacity(localized_quick_replies.len());
    for quick_reply in &localized_quick_replies {
        let (evaluated, _) = run.evaluate_template(quick_reply, log);
        if evaluated.is_empty() {
            log(Event::error("quick reply evaluated to empty string, skipping"));
            continue;
        }
        evaluated_quick_replies.push(QuickReply::new(truncate_ellipsis(
            &evaluated,
            MAX_QUICK_REPLY_LENGTH,
        )));
    }

    // the parts can come from different languages, so go with whichever
    // part the author actually wrote
    let language = if !localized_text.is_empty() {
        text_lang
    } else if !localized_attachments.is_empty() {
        attachments_lang
    } else if !localized_quick_replies.is_empty() {
        quick_replies_lang
    } else {
        None
    };

    (
        MsgContent {
            text: evaluated_text,
            attachments: evaluated_attachments,
            quick_replies: evaluated_quick_replies,
        },
        language,
    )
}

/// Saves a result on the run, logging `run_result_changed` if it changed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn save_result(
    run: &mut dyn Run,
    step: &Step,
    name: &str,
    value: &str,
    category: &str,
    category_localized: &str,
    input: Option<String>,
    extra: Option<Value>,
    log: &mut EventCallback<'_>,
) {
    let max_chars = run.session().engine().options().max_result_chars;
    let result = RunResult {
        name: name.to_string(),
        value: truncate_chars(value, max_chars),
        category: category.to_string(),
        category_localized: category_localized.to_string(),
        node_uuid: step.node_uuid,
        input,
        extra,
        created_on: Utc::now(),
    };
    let (prev, changed) = run.set_result(result.clone());
    if changed {
        log(Event::new(RunResultChanged::new(&result, prev.as_ref())));
    }
}

/// Saves a result describing a webhook call: the status code as value and
/// the JSON response, if small enough, as extra.
pub(crate) fn save_webhook_result(
    run: &mut dyn Run,
    step: &Step,
    name: &str,
    call: &WebhookCall,
    status: CallStatus,
    log: &mut EventCallback<'_>,
) {
    let input = format!("{} {}", call.method, call.url);
    let value = call.response_status.unwrap_or_default().to_string();
    let extra = call.response_json().filter(|json| {
        serde_json::to_vec(json).map_or(false, |bytes| bytes.len() < RESULT_EXTRA_MAX_BYTES)
    });
    save_result(
        run,
        step,
        name,
        &value,
        webhook_category(status),
        "",
        Some(input),
        extra,
        log,
    );
}

/// Logs a modifier and applies it to the run's contact, re-evaluating
/// dynamic groups if it changed anything.
pub(crate) fn apply_modifier(
    run: &mut dyn Run,
    modifier: Modifier,
    log_modifier: &mut ModifierCallback<'_>,
    log_event: &mut EventCallback<'_>,
) -> bool {
    let session = run.session_mut();
    let engine = Arc::clone(session.engine());
    let assets = Arc::clone(session.assets());
    let env = session.merged_environment();
    let Some(contact) = session.contact_mut() else {
        return false;
    };

    log_modifier(modifier.clone());
    modifiers::apply(&engine, &env, &assets, contact, &modifier, log_event)
}

/// Ends the run as failed.
pub(crate) fn fail(run: &mut dyn Run, text: &str, log: &mut EventCallback<'_>) {
    run.exit(RunStatus::Failed);
    log(Event::failure(text));
    log(Event::new(RunEnded {
        run_uuid: run.uuid(),
        flow: run.flow_reference(),
        status: RunStatus::Failed,
    }));
}

/// Ends the run as errored with a fatal error.
pub(crate) fn fatal(run: &mut dyn Run, text: &str, log: &mut EventCallback<'_>) {
    run.exit(RunStatus::Errored);
    log(Event::fatal(text));
    log(Event::new(RunEnded {
        run_uuid: run.uuid(),
        flow: run.flow_reference(),
        status: RunStatus::Errored,
    }));
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Resolves group references. Fixed references which no longer exist are
/// logged as dependency errors and skipped. Name matches are evaluated and
/// looked up by name, creating the group if there's none yet.
pub(crate) fn resolve_groups(
    run: &dyn Run,
    references: &[GroupReference],
    log: &mut EventCallback<'_>,
) -> Vec<Arc<Group>> {
    let groups = run.session().assets().groups();
    let mut resolved = Vec::with_capacity(references.len());

    for reference in references {
        match reference {
            GroupReference::Fixed { uuid, .. } => match groups.get(*uuid) {
                Some(group) => resolved.push(group),
                None => log(Event::dependency_error(&AssetReference::Group(
                    reference.clone(),
                ))),
            },
            GroupReference::Variable { name_match } => {
                let (name, ok) = run.evaluate_template(name_match, log);
                if !ok {
                    continue;
                }
                let name = name.trim();
                if name.is_empty() {
                    log(Event::error(format!("no such group with name '{name}'")));
                    continue;
                }
                resolved.push(groups.find_or_create(name, || Group::new(Uuid::new_v4(), name)));
            }
        }
    }
    resolved
}

/// Resolves label references the same way as groups.
pub(crate) fn resolve_labels(
    run: &dyn Run,
    references: &[LabelReference],
    log: &mut EventCallback<'_>,
) -> Vec<Arc<Label>> {
    let labels = run.session().assets().labels();
    let mut resolved = Vec::with_capacity(references.len());

    for reference in references {
        match reference {
            LabelReference::Fixed { uuid, .. } => match labels.get(*uuid) {
                Some(label) => resolved.push(label),
                None => log(Event::dependency_error(&AssetReference::Label(
                    reference.clone(),
                ))),
            },
            LabelReference::Variable { name_match } => {
                let (name, ok) = run.evaluate_template(name_match, log);
                if !ok {
                    continue;
                }
                let name = name.trim();
                if name.is_empty() {
                    log(Event::error(format!("no such label with name '{name}'")));
                    continue;
                }
                resolved.push(labels.find_or_create(name, || Label {
                    uuid: Uuid::new_v4(),
                    name: name.to_string(),
                }));
            }
        }
    }
    resolved
}

/// Resolves a user by email, or by evaluated email for email matches.
pub(crate) fn resolve_user(
    run: &dyn Run,
    reference: &UserReference,
    log: &mut EventCallback<'_>,
) -> Option<Arc<User>> {
    let users = run.session().assets().users();
    match reference {
        UserReference::Fixed { email, .. } => {
            let user = users.find_by_email(email);
            if user.is_none() {
                log(Event::dependency_error(&AssetReference::User(
                    reference.clone(),
                )));
            }
            user
        }
        UserReference::Variable { email_match } => {
            let (email, ok) = run.evaluate_template(email_match, log);
            if !ok {
                return None;
            }
            let email = email.trim();
            let user = users.find_by_email(email);
            if user.is_none() {
                log(Event::error(format!("no such user with email '{email}'")));
            }
            user
        }
    }
}

/// Parses evaluated text as a URN, falling back to reading it as a local
/// phone number.
pub(crate) fn parse_urn(run: &dyn Run, text: &str) -> Option<Urn> {
    let urn = Urn::from(text);
    if urn.validate().is_ok() {
        return Some(urn.normalize());
    }
    let env = run.session().merged_environment();
    parse_phone_number(text, env.default_country.as_deref())
        .map(|number| Urn::from_raw(format!("tel:{number}")))
}

// ---------------------------------------------------------------------------
// Recipients of broadcasts and new sessions
// ---------------------------------------------------------------------------

/// Recipient fields shared by actions which reach other contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherContacts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<ContactReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contact_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urns: Vec<Urn>,
    /// Expressions which may evaluate to a contact UUID, group name or URN.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legacy_vars: Vec<String>,
}

/// Recipients after evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Recipients {
    pub groups: Vec<GroupReference>,
    pub contacts: Vec<ContactReference>,
    pub contact_query: String,
    pub urns: Vec<Urn>,
}

impl Recipients {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.contacts.is_empty()
            && self.contact_query.is_empty()
            && self.urns.is_empty()
    }
}

impl OtherContacts {
    pub(crate) fn resolve(&self, run: &dyn Run, log: &mut EventCallback<'_>) -> Recipients {
        let group_assets = run.session().assets().groups();

        let mut urns = self.urns.clone();
        let mut contacts = self.contacts.clone();
        let mut groups: Vec<GroupReference> = resolve_groups(run, &self.groups, log)
            .iter()
            .map(|g| g.reference())
            .collect();

        for legacy_var in &self.legacy_vars {
            let evaluated = evaluate_trimmed(run, legacy_var, log);

            let contact_uuid = Some(&evaluated)
                .filter(|v| v.len() == 36)
                .and_then(|v| Uuid::parse_str(v).ok());

            if let Some(uuid) = contact_uuid {
                contacts.push(ContactReference::new(uuid, ""));
            } else if let Some(group) = group_assets.find_by_name(&evaluated) {
                groups.push(group.reference());
            } else if let Some(urn) = parse_urn(run, &evaluated) {
                urns.push(urn);
            } else {
                log(Event::error(format!(
                    "'{evaluated}' couldn't be resolved to a contact, group or URN"
                )));
            }
        }

        let contact_query = evaluate_trimmed(run, &self.contact_query, log);

        Recipients {
            groups,
            contacts,
            contact_query,
            urns,
        }
    }

    pub(crate) fn inspect(&self, dependency: &mut super::DependencyCallback<'_>) {
        for group in &self.groups {
            dependency(AssetReference::Group(group.clone()));
        }
        for contact in &self.contacts {
            dependency(AssetReference::Contact(contact.clone()));
        }
    }
}
