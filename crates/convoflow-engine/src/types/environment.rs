//! Session environment: locale, formats and redaction settings.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDay,
    #[default]
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYear,
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionPolicy {
    #[default]
    None,
    Urns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal_symbol: String,
    pub digit_grouping_symbol: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_symbol: ".".into(),
            digit_grouping_symbol: ",".into(),
        }
    }
}

/// Environment of a session. Merged with the contact's language and
/// timezone to produce the environment actions evaluate in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub date_format: DateFormat,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_country: Option<String>,
    #[serde(default)]
    pub number_format: NumberFormat,
    #[serde(default)]
    pub redaction_policy: RedactionPolicy,
    #[serde(default = "default_collation")]
    pub input_collation: String,
}

fn default_time_format() -> String {
    "tt:mm".into()
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_collation() -> String {
    "default".into()
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            date_format: DateFormat::default(),
            time_format: default_time_format(),
            timezone: default_timezone(),
            allowed_languages: Vec::new(),
            default_country: None,
            number_format: NumberFormat::default(),
            redaction_policy: RedactionPolicy::default(),
            input_collation: default_collation(),
        }
    }
}

impl Environment {
    /// Parsed timezone, falling back to UTC if the name is unknown.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    /// First allowed language, which is the default language.
    pub fn default_language(&self) -> Option<&str> {
        self.allowed_languages.first().map(String::as_str)
    }

    /// Default locale as `lang-COUNTRY` (either part may be missing).
    pub fn default_locale(&self) -> String {
        locale(self.default_language(), self.default_country.as_deref())
    }

    /// Merges contact preferences over this environment. The contact's
    /// language leads the allowed languages when it is one of them.
    pub fn merged(&self, language: Option<&str>, timezone: Option<&str>) -> Environment {
        let mut merged = self.clone();
        if let Some(lang) = language {
            if merged.allowed_languages.iter().any(|l| l == lang) {
                merged.allowed_languages.retain(|l| l != lang);
                merged.allowed_languages.insert(0, lang.to_string());
            }
        }
        if let Some(tz) = timezone {
            merged.timezone = tz.to_string();
        }
        merged
    }

    pub fn redact_urns(&self) -> bool {
        self.redaction_policy == RedactionPolicy::Urns
    }
}

/// Formats a locale string from optional language and country parts.
pub fn locale(language: Option<&str>, country: Option<&str>) -> String {
    match (language, country) {
        (Some(l), Some(c)) => format!("{l}-{c}"),
        (Some(l), None) => l.to_string(),
        (None, Some(c)) => format!("und-{c}"),
        (None, None) => String::new(),
    }
}

/// Whether a string is a plausible ISO-639-3 language code.
pub fn is_valid_language(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_lowercase())
}

/// Parses an IANA timezone name.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let env: Environment = serde_json::from_value(json!({})).unwrap();
        assert_eq!(env.date_format, DateFormat::DayMonthYear);
        assert_eq!(env.timezone, "UTC");
        assert_eq!(env.tz(), Tz::UTC);
        assert_eq!(env.default_locale(), "");
    }

    #[test]
    fn test_merged() {
        let env = Environment {
            allowed_languages: vec!["eng".into(), "spa".into()],
            default_country: Some("RW".into()),
            ..Default::default()
        };
        let merged = env.merged(Some("spa"), Some("Africa/Kigali"));
        assert_eq!(merged.default_language(), Some("spa"));
        assert_eq!(merged.default_locale(), "spa-RW");
        assert_eq!(merged.tz(), chrono_tz::Africa::Kigali);

        // languages not in the allowed list are ignored
        let merged = env.merged(Some("fra"), None);
        assert_eq!(merged.default_language(), Some("eng"));
    }

    #[test]
    fn test_validators() {
        assert!(is_valid_language("eng"));
        assert!(!is_valid_language("english"));
        assert!(parse_timezone("America/Guayaquil").is_some());
        assert!(parse_timezone("Cuenca").is_none());
    }
}
