//! Error types for reading, executing and calling out.
//!
//! Conditions a flow can recover from are never errors here: they are logged
//! as events and execution continues. These types cover what's left.

use thiserror::Error;

/// Errors from decoding or validating actions, events, modifiers and assets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadError {
    #[error("field 'type' is required")]
    MissingType,
    #[error("unknown type: '{name}'")]
    UnknownType { name: String },
    #[error("{message}")]
    Decode { message: String },
    #[error("{message}")]
    Validation { message: String },
    #[error("event type '{event_type}' cannot be created by {origin}")]
    Origin { event_type: String, origin: String },
}

impl ReadError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn decode(type_name: &str, err: serde_json::Error) -> Self {
        Self::Decode {
            message: format!("unable to read {type_name}: {err}"),
        }
    }
}

/// Errors returned by action execution. Any of these aborts the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    #[error("unable to marshal run snapshot: {message}")]
    Snapshot { message: String },
    #[error("action failed: {message}")]
    Fatal { message: String },
}

/// Errors from replaying an event against a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApplyError {
    #[error("can't apply event '{event_type}': {message}")]
    Invalid { event_type: String, message: String },
}

/// Errors from constructing or calling an external service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("no {service} service configured")]
    NotConfigured { service: String },
    #[error("{message}")]
    Request { message: String },
    #[error("{message}")]
    Response { message: String },
}

/// Errors from parsing or evaluating a dynamic group query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error("parse error: {message}")]
    Parse { message: String },
    #[error("evaluation error: {message}")]
    Eval { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_messages() {
        assert_eq!(ReadError::MissingType.to_string(), "field 'type' is required");
        assert_eq!(
            ReadError::UnknownType { name: "x".into() }.to_string(),
            "unknown type: 'x'"
        );
        assert_eq!(
            ReadError::Origin {
                event_type: "msg_received".into(),
                origin: "engine".into()
            }
            .to_string(),
            "event type 'msg_received' cannot be created by engine"
        );
        assert_eq!(
            ServiceError::NotConfigured {
                service: "airtime".into()
            }
            .to_string(),
            "no airtime service configured"
        );
    }
}
