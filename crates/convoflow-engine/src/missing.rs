//! Reporting of assets that no longer exist when reading modifiers, events
//! and contacts.

use crate::types::AssetReference;

/// Called once per reference that couldn't be resolved. The optional
/// message explains why, e.g. an invalid value that was also dropped.
pub type MissingCallback<'a> = dyn FnMut(AssetReference, Option<String>) + Send + 'a;

/// A callback which discards missing references.
pub fn ignore_missing(_: AssetReference, _: Option<String>) {}
