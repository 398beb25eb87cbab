//! Flow localization: translated text for action properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `language -> item uuid -> property -> values`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Localization(BTreeMap<String, BTreeMap<Uuid, BTreeMap<String, Vec<String>>>>);

impl Localization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, language: &str, item: Uuid, property: &str) -> Option<&[String]> {
        self.0
            .get(language)?
            .get(&item)?
            .get(property)
            .map(Vec::as_slice)
    }

    pub fn set(&mut self, language: &str, item: Uuid, property: &str, values: Vec<String>) {
        self.0
            .entry(language.to_string())
            .or_default()
            .entry(item)
            .or_default()
            .insert(property.to_string(), values);
    }

    /// Returns the values for the first of `languages` with a translation,
    /// and that language. The flow's native language (or no translation)
    /// falls back to `native` with no language.
    pub fn get_text_array(
        &self,
        item: Uuid,
        property: &str,
        native: &[String],
        native_language: Option<&str>,
        languages: &[String],
    ) -> (Vec<String>, Option<String>) {
        for language in languages {
            if Some(language.as_str()) == native_language {
                break;
            }
            if let Some(values) = self.get(language, item, property) {
                if !values.is_empty() {
                    return (values.to_vec(), Some(language.clone()));
                }
            }
        }
        (native.to_vec(), native_language.map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_text_array() {
        let item = Uuid::new_v4();
        let mut loc = Localization::new();
        loc.set("spa", item, "text", vec!["Hola".into()]);
        loc.set("fra", item, "text", vec![]);

        let native = vec!["Hello".to_string()];
        let (values, lang) = loc.get_text_array(
            item,
            "text",
            &native,
            Some("eng"),
            &["fra".into(), "spa".into()],
        );
        assert_eq!(values, vec!["Hola"]);
        assert_eq!(lang.as_deref(), Some("spa"));

        let (values, lang) =
            loc.get_text_array(item, "text", &native, Some("eng"), &["eng".into(), "spa".into()]);
        assert_eq!(values, vec!["Hello"]);
        assert_eq!(lang.as_deref(), Some("eng"));
    }
}
