//! Group membership: the groups modifier and dynamic group re-evaluation.

use std::sync::Arc;

use crate::assets::{Group, SessionAssets};
use crate::events::{ContactGroupsChanged, Event};
use crate::query;
use crate::run::EventCallback;
use crate::types::{Contact, ContactStatus};

use super::GroupsModification;

pub(super) fn apply_groups(
    contact: &mut Contact,
    groups: &[Arc<Group>],
    modification: GroupsModification,
    log: &mut EventCallback<'_>,
) -> bool {
    if matches!(
        contact.status(),
        ContactStatus::Blocked | ContactStatus::Stopped
    ) {
        log(Event::error("Can't add blocked or stopped contacts to groups"));
        return false;
    }

    let mut added = Vec::new();
    let mut removed = Vec::new();

    for group in groups {
        if group.is_dynamic() {
            let text = match modification {
                GroupsModification::Add => {
                    format!("Can't add contacts to the query based group '{}'", group.name)
                }
                GroupsModification::Remove => format!(
                    "Can't remove contacts from the query based group '{}'",
                    group.name
                ),
            };
            log(Event::error(text));
            continue;
        }

        match modification {
            GroupsModification::Add => {
                if contact.groups_mut().add(Arc::clone(group)) {
                    added.push(Arc::clone(group));
                }
            }
            GroupsModification::Remove => {
                if contact.groups_mut().remove(group.uuid) {
                    removed.push(Arc::clone(group));
                }
            }
        }
    }

    if added.is_empty() && removed.is_empty() {
        return false;
    }
    log(Event::new(ContactGroupsChanged::new(&added, &removed)));
    true
}

/// Recomputes membership of every dynamic group and, for contacts that
/// aren't active, drops all static groups too. Logs at most one
/// `contact_groups_changed` event. Returns the groups added and removed.
pub fn reevaluate_groups(
    assets: &SessionAssets,
    contact: &mut Contact,
    log: &mut EventCallback<'_>,
) -> (Vec<Arc<Group>>, Vec<Arc<Group>>) {
    let active = contact.status() == ContactStatus::Active;
    let context = contact.query_context(assets);

    let mut added = Vec::new();
    let mut removed = Vec::new();

    for group in assets.groups().all().into_iter().filter(|g| g.is_dynamic()) {
        let query = group.query.as_deref().unwrap_or_default();
        let should_be_member = active
            && match query::matches(query, &context) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(group = %group.uuid, query, error = %e, "unable to evaluate group query");
                    continue;
                }
            };
        let is_member = contact.groups().contains(group.uuid);

        if should_be_member && !is_member {
            contact.groups_mut().add(Arc::clone(&group));
            added.push(group);
        } else if !should_be_member && is_member {
            contact.groups_mut().remove(group.uuid);
            removed.push(group);
        }
    }

    if !active {
        let statics: Vec<Arc<Group>> = contact.groups().all().to_vec();
        for group in statics {
            contact.groups_mut().remove(group.uuid);
            removed.push(group);
        }
    }

    if !added.is_empty() || !removed.is_empty() {
        log(Event::new(ContactGroupsChanged::new(&added, &removed)));
    }
    (added, removed)
}
