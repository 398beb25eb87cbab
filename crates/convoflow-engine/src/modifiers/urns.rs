//! URN modifiers.

use crate::assets::Channel;
use crate::engine::Engine;
use crate::events::{ContactUrnsChanged, Event};
use crate::run::EventCallback;
use crate::types::{parse_phone_number, Contact, Environment, Urn};

use super::UrnsModification;

/// Normalizes a URN, resolving local phone numbers with the default
/// country. Logs an error and returns `None` if it isn't valid.
fn normalize(env: &Environment, urn: &Urn, log: &mut EventCallback<'_>) -> Option<Urn> {
    let mut normalized = urn.normalize();
    if normalized.is_phone() && !normalized.path().starts_with('+') {
        if let Some(number) = parse_phone_number(normalized.path(), env.default_country.as_deref()) {
            normalized = Urn::from_raw(format!("tel:{number}"));
        }
    }
    match normalized.validate() {
        Ok(()) => Some(normalized),
        Err(_) => {
            log(Event::error(format!("'{urn}' is not valid URN")));
            None
        }
    }
}

pub(super) fn apply_urns(
    engine: &Engine,
    env: &Environment,
    contact: &mut Contact,
    urns: &[Urn],
    modification: UrnsModification,
    log: &mut EventCallback<'_>,
) -> bool {
    let max = engine.options().max_urns_per_contact;
    let valid: Vec<Urn> = urns.iter().filter_map(|u| normalize(env, u, log)).collect();

    let mut updated = contact.urns().to_vec();
    if modification == UrnsModification::Set {
        updated.clear();
    }

    match modification {
        UrnsModification::Append | UrnsModification::Set => {
            for urn in valid {
                let identity = urn.identity();
                if updated.iter().any(|u| u.identity() == identity) {
                    continue;
                }
                if updated.len() >= max {
                    log(Event::error(format!(
                        "contact has too many URNs, limit is {max}"
                    )));
                    break;
                }
                updated.push(urn);
            }
        }
        UrnsModification::Remove => {
            for urn in valid {
                let identity = urn.identity();
                updated.retain(|u| u.identity() != identity);
            }
        }
    }

    if !contact.set_urns(updated) {
        return false;
    }
    log(Event::new(ContactUrnsChanged {
        urns: contact.urns().to_vec(),
    }));
    true
}

pub(super) fn apply_affinity(
    contact: &mut Contact,
    urn: &Urn,
    channel: &Channel,
    log: &mut EventCallback<'_>,
) -> bool {
    if !contact.set_affinity(urn, channel) {
        return false;
    }
    log(Event::new(ContactUrnsChanged {
        urns: contact.urns().to_vec(),
    }));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::test_support;

    fn apply(
        engine: &Engine,
        contact: &mut Contact,
        urns: &[&str],
        modification: UrnsModification,
    ) -> (bool, Vec<Event>) {
        let urns: Vec<Urn> = urns.iter().map(|u| Urn::from(*u)).collect();
        let mut events = Vec::new();
        let modified = apply_urns(
            engine,
            &Environment::default(),
            contact,
            &urns,
            modification,
            &mut |e: Event| events.push(e),
        );
        (modified, events)
    }

    #[test]
    fn test_append_and_remove() {
        let engine = Engine::default();
        let mut contact = test_support::default_contact();
        let before = contact.urns().len();

        let (modified, events) = apply(
            &engine,
            &mut contact,
            &["twitter:Jimmy"],
            UrnsModification::Append,
        );
        assert!(modified);
        assert_eq!(events.len(), 1);
        assert_eq!(contact.urns().len(), before + 1);

        let (modified, events) = apply(
            &engine,
            &mut contact,
            &["twitter:jimmy"],
            UrnsModification::Append,
        );
        assert!(!modified);
        assert!(events.is_empty());

        let (modified, _) = apply(
            &engine,
            &mut contact,
            &["twitter:jimmy"],
            UrnsModification::Remove,
        );
        assert!(modified);
        assert_eq!(contact.urns().len(), before);
    }

    #[test]
    fn test_invalid_urn_logged() {
        let engine = Engine::default();
        let mut contact = test_support::default_contact();
        let (modified, events) = apply(&engine, &mut contact, &["xyz:"], UrnsModification::Append);
        assert!(!modified);
        match &events[0].kind {
            EventKind::Error(e) => assert_eq!(e.text, "'xyz:' is not valid URN"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_urn_limit() {
        let engine = Engine::builder().max_urns_per_contact(2).build().unwrap();
        let mut contact = test_support::default_contact();
        let (modified, events) = apply(
            &engine,
            &mut contact,
            &["tel:+250788111111", "tel:+250788222222", "tel:+250788333333"],
            UrnsModification::Set,
        );
        assert!(modified);
        assert_eq!(contact.urns().len(), 2);
        assert_eq!(events.len(), 2);
        match &events[0].kind {
            EventKind::Error(e) => assert_eq!(e.text, "contact has too many URNs, limit is 2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
