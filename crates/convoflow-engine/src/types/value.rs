//! Contact field values.
//!
//! A value always has its original text, plus typed interpretations when
//! the text parses as a number or a date.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use super::environment::{DateFormat, Environment};

/// Value type declared by a field asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Datetime,
    State,
    District,
    Ward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<FixedOffset>>,
}

impl FieldValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            number: None,
            datetime: None,
        }
    }

    /// Interprets raw text in the given environment.
    pub fn parse(text: &str, env: &Environment) -> Self {
        Self {
            text: text.to_string(),
            number: parse_number(text),
            datetime: parse_datetime(text, env),
        }
    }

    /// The value as seen by queries for a field of the given type.
    pub fn typed(&self, field_type: FieldType) -> serde_json::Value {
        match field_type {
            FieldType::Number => self
                .number
                .clone()
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldType::Datetime => self
                .datetime
                .map(|d| serde_json::Value::String(d.to_rfc3339()))
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::String(self.text.clone()),
        }
    }
}

/// Parses a decimal number, keeping integers as integers.
pub fn parse_number(text: &str) -> Option<Number> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::from(i));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

/// Parses an ISO8601 datetime, or a date in the environment's date format
/// (midnight in the environment's timezone).
pub fn parse_datetime(text: &str, env: &Environment) -> Option<DateTime<FixedOffset>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let parts: Vec<&str> = trimmed.split(['-', '/', '.']).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
        return None;
    }
    let num = |i: usize| parts[i].parse::<u32>().ok();
    let (y, m, d) = if parts[0].len() == 4 {
        (num(0)?, num(1)?, num(2)?)
    } else {
        match env.date_format {
            DateFormat::MonthDayYear => (num(2)?, num(0)?, num(1)?),
            DateFormat::DayMonthYear | DateFormat::YearMonthDay => (num(2)?, num(1)?, num(0)?),
        }
    };
    let year = i32::try_from(y).ok()?;
    let year = if year < 100 { year + 2000 } else { year };
    let date = NaiveDate::from_ymd_opt(year, m, d)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    env.tz()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.fixed_offset())
}
