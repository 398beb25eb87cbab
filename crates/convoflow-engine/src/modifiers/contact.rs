//! Modifiers of contact attributes.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::assets::{Channel, ChannelRole, Field};
use crate::engine::Engine;
use crate::events::{
    ContactFieldChanged, ContactLanguageChanged, ContactLastSeenOnChanged, ContactNameChanged,
    ContactStatusChanged, ContactTimezoneChanged, ContactUrnsChanged, Event,
};
use crate::run::EventCallback;
use crate::types::{truncate_chars, Contact, ContactStatus, Environment, FieldValue};

pub(super) fn apply_name(contact: &mut Contact, name: &str, log: &mut EventCallback<'_>) -> bool {
    if contact.name() == name {
        return false;
    }
    contact.set_name(name);
    log(Event::new(ContactNameChanged {
        name: name.to_string(),
    }));
    true
}

pub(super) fn apply_language(
    contact: &mut Contact,
    language: Option<&str>,
    log: &mut EventCallback<'_>,
) -> bool {
    let language = language.filter(|l| !l.is_empty());
    if contact.language() == language {
        return false;
    }
    contact.set_language(language.map(str::to_string));
    log(Event::new(ContactLanguageChanged {
        language: language.unwrap_or_default().to_string(),
    }));
    true
}

pub(super) fn apply_timezone(
    contact: &mut Contact,
    timezone: Option<Tz>,
    log: &mut EventCallback<'_>,
) -> bool {
    if contact.timezone() == timezone {
        return false;
    }
    contact.set_timezone(timezone);
    log(Event::new(ContactTimezoneChanged {
        timezone: timezone.map(|tz| tz.name().to_string()).unwrap_or_default(),
    }));
    true
}

pub(super) fn apply_status(
    contact: &mut Contact,
    status: ContactStatus,
    log: &mut EventCallback<'_>,
) -> bool {
    if contact.status() == status {
        return false;
    }
    contact.set_status(status);
    log(Event::new(ContactStatusChanged { status }));
    true
}

pub(super) fn apply_channel(
    contact: &mut Contact,
    channel: &Channel,
    log: &mut EventCallback<'_>,
) -> bool {
    if !channel.has_role(ChannelRole::Send) {
        log(Event::error(
            "can't set channel that can't send as the preferred channel",
        ));
        return false;
    }
    if !contact.update_preferred_channel(channel) {
        return false;
    }
    log(Event::new(ContactUrnsChanged {
        urns: contact.urns().to_vec(),
    }));
    true
}

pub(super) fn apply_field(
    engine: &Engine,
    env: &Environment,
    contact: &mut Contact,
    field: &Field,
    value: &str,
    log: &mut EventCallback<'_>,
) -> bool {
    let value = truncate_chars(value.trim(), engine.options().max_field_chars);
    let new_value = if value.is_empty() {
        None
    } else {
        Some(FieldValue::parse(&value, env))
    };

    if !contact.set_field_value(&field.key, new_value.clone()) {
        return false;
    }
    log(Event::new(ContactFieldChanged {
        field: field.reference(),
        value: new_value,
    }));
    true
}

pub(super) fn apply_seen(
    contact: &mut Contact,
    seen_on: DateTime<Utc>,
    log: &mut EventCallback<'_>,
) -> bool {
    if contact.last_seen_on() == Some(seen_on) {
        return false;
    }
    contact.set_last_seen_on(seen_on);
    log(Event::new(ContactLastSeenOnChanged {
        last_seen_on: seen_on,
    }));
    true
}
