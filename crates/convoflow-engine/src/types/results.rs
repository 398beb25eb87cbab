//! Run results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const CATEGORY_SUCCESS: &str = "Success";
pub const CATEGORY_SKIPPED: &str = "Skipped";
pub const CATEGORY_FAILURE: &str = "Failure";

/// Max bytes of JSON saved as a result's extra.
pub const RESULT_EXTRA_MAX_BYTES: usize = 10000;

/// A named result saved on a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category_localized: String,
    pub node_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub created_on: DateTime<Utc>,
}

impl RunResult {
    /// The key a result is stored under.
    pub fn key(&self) -> String {
        result_key(&self.name)
    }

    /// Whether saving `other` over this result changes anything visible.
    pub fn differs_from(&self, other: &RunResult) -> bool {
        self.value != other.value
            || self.category != other.category
            || self.category_localized != other.category_localized
            || self.extra != other.extra
            || self.input != other.input
    }
}

/// Results of a run keyed by snakified name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Results(BTreeMap<String, RunResult>);

impl Results {
    pub fn get(&self, key: &str) -> Option<&RunResult> {
        self.0.get(key)
    }

    /// Saves a result, returning the previous one under the same key and
    /// whether anything changed.
    pub fn save(&mut self, result: RunResult) -> (Option<RunResult>, bool) {
        let key = result.key();
        let prev = self.0.insert(key, result.clone());
        let changed = prev.as_ref().map_or(true, |p| p.differs_from(&result));
        (prev, changed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RunResult)> {
        self.0.iter()
    }
}

/// Declared result of an action or router, reported by inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInfo {
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl ResultInfo {
    pub fn new(name: &str, categories: &[&str]) -> Self {
        Self {
            key: result_key(name),
            name: name.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// `"Favorite Color"` -> `"favorite_color"`.
pub fn result_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut last_underscore = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            key.extend(c.to_lowercase());
            last_underscore = false;
        } else if !last_underscore && !key.is_empty() {
            key.push('_');
            last_underscore = true;
        }
    }
    key.trim_end_matches('_').to_string()
}

/// Whether a name is usable as a result name.
pub fn is_valid_result_name(name: &str) -> bool {
    !name.trim().is_empty() && name.chars().count() <= 64 && !result_key(name).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, value: &str, category: &str) -> RunResult {
        RunResult {
            name: name.into(),
            value: value.into(),
            category: category.into(),
            category_localized: String::new(),
            node_uuid: Uuid::nil(),
            input: None,
            extra: None,
            created_on: Utc::now(),
        }
    }

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("Favorite Color"), "favorite_color");
        assert_eq!(result_key("  Age?? "), "age");
        assert_eq!(result_key("1st-Response"), "1st_response");
        assert!(!is_valid_result_name("  "));
        assert!(!is_valid_result_name("???"));
    }

    #[test]
    fn test_save_reports_changes() {
        let mut results = Results::default();
        let (prev, changed) = results.save(result("Color", "red", "Red"));
        assert!(prev.is_none());
        assert!(changed);

        let (prev, changed) = results.save(result("Color", "red", "Red"));
        assert!(prev.is_some());
        assert!(!changed);

        let (_, changed) = results.save(result("color", "blue", "Blue"));
        assert!(changed);
        assert_eq!(results.get("color").unwrap().value, "blue");
    }
}
