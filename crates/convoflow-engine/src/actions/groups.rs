//! Group membership actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::{apply_modifier, resolve_groups};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::assets::Group;
use crate::errors::{ActionError, ReadError};
use crate::modifiers::{GroupsModification, Modifier};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::types::{AssetReference, GroupReference};

fn inspect_groups(groups: &[GroupReference], dependency: &mut DependencyCallback<'_>) {
    for group in groups {
        dependency(AssetReference::Group(group.clone()));
    }
}

/// The contact's groups which aren't query based.
fn static_groups(run: &dyn Run) -> Vec<Arc<Group>> {
    run.contact()
        .map(|c| {
            c.groups()
                .all()
                .iter()
                .filter(|g| !g.is_dynamic())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn apply_groups(
    run: &mut dyn Run,
    groups: Vec<Arc<Group>>,
    modification: GroupsModification,
    log_modifier: &mut ModifierCallback<'_>,
    log_event: &mut EventCallback<'_>,
) {
    if groups.is_empty() {
        return;
    }
    let modifier = Modifier::Groups {
        groups,
        modification,
    };
    apply_modifier(run, modifier, log_modifier, log_event);
}

// ---------------------------------------------------------------------------
// add_contact_groups
// ---------------------------------------------------------------------------

/// Adds the contact to groups. Query based groups are skipped with an error.
///
/// ```json
/// {
///   "type": "add_contact_groups",
///   "uuid": "...",
///   "groups": [{"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddContactGroups {
    #[serde(flatten)]
    pub base: ActionBase,
    pub groups: Vec<GroupReference>,
}

#[async_trait]
impl Action for AddContactGroups {
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
        let groups = resolve_groups(run, &self.groups, log_event);
        apply_groups(run, groups, GroupsModification::Add, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        inspect_groups(&self.groups, dependency);
    }
}

// ---------------------------------------------------------------------------
// remove_contact_groups
// ---------------------------------------------------------------------------

/// Removes the contact from groups, or from every group that isn't query
/// based when `all_groups` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveContactGroups {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_groups: bool,
}

#[async_trait]
impl Action for RemoveContactGroups {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if self.all_groups && !self.groups.is_empty() {
            return Err(ReadError::validation(
                "can't specify specific groups when all_groups=true",
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
        let groups = if self.all_groups {
            static_groups(run)
        } else {
            resolve_groups(run, &self.groups, log_event)
        };
        apply_groups(run, groups, GroupsModification::Remove, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        inspect_groups(&self.groups, dependency);
    }
}

// ---------------------------------------------------------------------------
// legacy add_to_group / remove_from_group
// ---------------------------------------------------------------------------

/// Legacy form of `add_contact_groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToGroup {
    #[serde(flatten)]
    pub base: ActionBase,
    pub groups: Vec<GroupReference>,
}

#[async_trait]
impl Action for AddToGroup {
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
        let groups = resolve_groups(run, &self.groups, log_event);
        apply_groups(run, groups, GroupsModification::Add, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        inspect_groups(&self.groups, dependency);
    }
}

/// Legacy form of `remove_contact_groups`. No groups means all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFromGroup {
    #[serde(flatten)]
    pub base: ActionBase,
    #[serde(default)]
    pub groups: Vec<GroupReference>,
}

#[async_trait]
impl Action for RemoveFromGroup {
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
        let groups = if self.groups.is_empty() {
            static_groups(run)
        } else {
            resolve_groups(run, &self.groups, log_event)
        };
        apply_groups(run, groups, GroupsModification::Remove, log_modifier, log_event);
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        inspect_groups(&self.groups, dependency);
    }
}
