//! Contact URNs (`scheme:path[?query][#display]`).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const TEL_SCHEME: &str = "tel";
pub const WHATSAPP_SCHEME: &str = "whatsapp";
pub const EMAIL_SCHEME: &str = "mailto";

const KNOWN_SCHEMES: &[&str] = &[
    "discord",
    "ext",
    "facebook",
    "fcm",
    "freshchat",
    "instagram",
    "jiochat",
    "line",
    "mailto",
    "rocketchat",
    "slack",
    "tel",
    "telegram",
    "twitter",
    "twitterid",
    "viber",
    "vk",
    "webchat",
    "wechat",
    "whatsapp",
];

static TEL_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{1,16}$").expect("valid regex"));
static NUMERIC_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static TWITTER_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,15}$").expect("valid regex"));
static EMAIL_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("valid regex"));

/// Whether a scheme is one contacts can have URNs for.
pub fn is_known_scheme(scheme: &str) -> bool {
    KNOWN_SCHEMES.contains(&scheme)
}

/// Why a URN failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum UrnError {
    #[error("missing scheme")]
    MissingScheme,
    #[error("unknown scheme '{scheme}'")]
    UnknownScheme { scheme: String },
    #[error("invalid path for scheme '{scheme}'")]
    InvalidPath { scheme: String },
}

/// A contact URN. Kept in its string form so round-trips are exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Wraps a raw URN string without validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds a URN from scheme and path, normalizing the path.
    pub fn new(scheme: &str, path: &str) -> Result<Self, UrnError> {
        let urn = Self(format!("{}:{}", scheme.trim().to_lowercase(), path.trim())).normalize();
        urn.validate()?;
        Ok(urn)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme, e.g. `tel`.
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map(|(s, _)| s).unwrap_or("")
    }

    /// The path without query or display.
    pub fn path(&self) -> &str {
        let rest = self.0.split_once(':').map(|(_, p)| p).unwrap_or("");
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        &rest[..end]
    }

    /// The optional display portion after `#`.
    pub fn display(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, d)| d).filter(|d| !d.is_empty())
    }

    fn query(&self) -> Option<&str> {
        let before_display = self.0.split('#').next().unwrap_or("");
        before_display.split_once('?').map(|(_, q)| q)
    }

    /// A single query parameter value.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// The channel this URN has affinity for, if any.
    pub fn channel_uuid(&self) -> Option<Uuid> {
        self.query_param("channel").and_then(|v| Uuid::parse_str(v).ok())
    }

    /// `scheme:path`, which is what two URNs are compared by.
    pub fn identity(&self) -> Urn {
        Urn(format!("{}:{}", self.scheme(), self.path()))
    }

    /// Returns a copy with the channel affinity replaced (or removed).
    pub fn with_channel(&self, channel: Option<Uuid>) -> Urn {
        let mut params: Vec<(String, String)> = self
            .query()
            .map(|q| {
                q.split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .filter(|(k, _)| *k != "channel")
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(channel) = channel {
            params.insert(0, ("channel".to_string(), channel.to_string()));
        }
        let mut out = format!("{}:{}", self.scheme(), self.path());
        if !params.is_empty() {
            out.push('?');
            let joined: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            out.push_str(&joined.join("&"));
        }
        if let Some(display) = self.display() {
            out.push('#');
            out.push_str(display);
        }
        Urn(out)
    }

    pub fn validate(&self) -> Result<(), UrnError> {
        let Some((scheme, _)) = self.0.split_once(':') else {
            return Err(UrnError::MissingScheme);
        };
        if scheme.is_empty() {
            return Err(UrnError::MissingScheme);
        }
        if !KNOWN_SCHEMES.contains(&scheme) {
            return Err(UrnError::UnknownScheme {
                scheme: scheme.to_string(),
            });
        }
        let path = self.path();
        let valid = match scheme {
            TEL_SCHEME => TEL_PATH.is_match(path),
            WHATSAPP_SCHEME | "twitterid" | "telegram" | "viber" | "vk" => {
                NUMERIC_PATH.is_match(path) || (scheme == "viber" && !path.is_empty())
            }
            "twitter" => TWITTER_HANDLE.is_match(path),
            EMAIL_SCHEME => EMAIL_PATH.is_match(path),
            "facebook" => NUMERIC_PATH.is_match(path) || path.starts_with("ref:"),
            _ => !path.is_empty(),
        };
        if valid {
            Ok(())
        } else {
            Err(UrnError::InvalidPath {
                scheme: scheme.to_string(),
            })
        }
    }

    /// Normalizes the path for its scheme, keeping query and display.
    pub fn normalize(&self) -> Urn {
        let scheme = self.scheme().to_lowercase();
        let path = self.path().trim();
        let normalized = match scheme.as_str() {
            TEL_SCHEME => {
                let plus = path.starts_with('+');
                let digits: String = path.chars().filter(|c| c.is_ascii_digit()).collect();
                if plus || digits.len() > 10 && path.chars().any(|c| !c.is_ascii_digit()) {
                    format!("+{digits}")
                } else {
                    digits
                }
            }
            WHATSAPP_SCHEME => path.trim_start_matches('+').to_string(),
            "twitter" => path.trim_start_matches('@').to_lowercase(),
            EMAIL_SCHEME => path.to_lowercase(),
            _ => path.to_string(),
        };
        let mut out = format!("{scheme}:{normalized}");
        if let Some(q) = self.query() {
            out.push('?');
            out.push_str(q);
        }
        if let Some(d) = self.display() {
            out.push('#');
            out.push_str(d);
        }
        Urn(out)
    }

    /// Whether this URN addresses a phone number (tel or whatsapp).
    pub fn is_phone(&self) -> bool {
        matches!(self.scheme(), TEL_SCHEME | WHATSAPP_SCHEME)
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Urn {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// International calling codes for countries we can resolve local numbers in.
fn calling_code(country: &str) -> Option<&'static str> {
    Some(match country.to_uppercase().as_str() {
        "US" | "CA" => "1",
        "RW" => "250",
        "EC" => "593",
        "KE" => "254",
        "UG" => "256",
        "TZ" => "255",
        "NG" => "234",
        "GH" => "233",
        "ZA" => "27",
        "GB" => "44",
        "FR" => "33",
        "DE" => "49",
        "ES" => "34",
        "BR" => "55",
        "MX" => "52",
        "IN" => "91",
        "ID" => "62",
        "PK" => "92",
        "BD" => "880",
        "PH" => "63",
        _ => return None,
    })
}

/// Parses free text as a phone number, resolving local numbers against the
/// default country. Returns the E.164 form, or `None` if it doesn't look
/// like a phone number.
pub fn parse_phone_number(text: &str, default_country: Option<&str>) -> Option<String> {
    let text = text.trim();
    if text.is_empty()
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'))
    {
        return None;
    }
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if text.starts_with('+') {
        return (8..=15).contains(&digits.len()).then(|| format!("+{digits}"));
    }
    let code = calling_code(default_country?)?;
    if digits.starts_with(code) && digits.len() >= 10 {
        return Some(format!("+{digits}"));
    }
    let local = digits.trim_start_matches('0');
    if local.len() < 7 || local.len() + code.len() > 15 {
        return None;
    }
    Some(format!("+{code}{local}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let urn = Urn::from_raw(
            "tel:+12065551212?channel=57f1078f-88aa-46f4-a59a-948a5739c03d&id=123#Bob",
        );
        assert_eq!(urn.scheme(), "tel");
        assert_eq!(urn.path(), "+12065551212");
        assert_eq!(urn.display(), Some("Bob"));
        assert_eq!(
            urn.channel_uuid().unwrap().to_string(),
            "57f1078f-88aa-46f4-a59a-948a5739c03d"
        );
        assert_eq!(urn.identity().as_str(), "tel:+12065551212");
    }

    #[test]
    fn test_with_channel() {
        let urn = Urn::from_raw("twitterid:54784326227#nyaruka");
        let channel = Uuid::parse_str("57f1078f-88aa-46f4-a59a-948a5739c03d").unwrap();
        let with = urn.with_channel(Some(channel));
        assert_eq!(
            with.as_str(),
            "twitterid:54784326227?channel=57f1078f-88aa-46f4-a59a-948a5739c03d#nyaruka"
        );
        assert_eq!(with.with_channel(None), urn);
    }

    #[test]
    fn test_validate() {
        assert!(Urn::from("tel:+12065551212").validate().is_ok());
        assert!(Urn::from("mailto:foo@bar.com").validate().is_ok());
        assert!(Urn::from("twitter:nyaruka").validate().is_ok());
        assert_eq!(
            Urn::from("xyz:1234").validate(),
            Err(UrnError::UnknownScheme {
                scheme: "xyz".into()
            })
        );
        assert!(Urn::from("tel:abc").validate().is_err());
        assert!(Urn::from("1234").validate().is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            Urn::from("tel:+1 (206) 555-1212").normalize().as_str(),
            "tel:+12065551212"
        );
        assert_eq!(Urn::from("twitter:@NyaRuka").normalize().as_str(), "twitter:nyaruka");
        assert_eq!(
            Urn::from("mailto:Bob@Example.com").normalize().as_str(),
            "mailto:bob@example.com"
        );
        assert_eq!(
            Urn::from("whatsapp:+250788123123").normalize().as_str(),
            "whatsapp:250788123123"
        );
    }

    #[test]
    fn test_parse_phone_number() {
        assert_eq!(
            parse_phone_number("0788 123 123", Some("RW")).as_deref(),
            Some("+250788123123")
        );
        assert_eq!(
            parse_phone_number("+593979099111", None).as_deref(),
            Some("+593979099111")
        );
        assert_eq!(parse_phone_number("hello", Some("RW")), None);
        assert_eq!(parse_phone_number("123", Some("RW")), None);
    }
}
