//! The engine: options and service factories shared by every session.
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .max_field_chars(256)
//!     .webhook_service(|timeout| Ok(Arc::new(HttpWebhookService::new(timeout)?)))
//!     .build()?;
//! ```

mod builder;
pub mod error;

pub use builder::EngineBuilder;
pub use error::EngineError;

use std::time::Duration;

use crate::services::Services;

/// Limits applied while executing actions and modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Max steps in one sprint before the interpreter gives up. Default: 100.
    pub max_steps_per_sprint: usize,
    /// Max resumes of one session. Default: 500.
    pub max_resumes_per_session: usize,
    /// Max length of an evaluated template. Default: 10000.
    pub max_template_chars: usize,
    /// Field values are truncated to this many chars. Default: 640.
    pub max_field_chars: usize,
    /// Result values are truncated to this many chars. Default: 640.
    pub max_result_chars: usize,
    /// URNs a contact can have. Default: 100.
    pub max_urns_per_contact: usize,
    /// Token limit passed to LLM services. Default: 2500.
    pub llm_max_tokens: u32,
    /// Timeout for each webhook call. Default: 15s.
    pub webhook_timeout: Duration,
    /// Request and response traces are truncated to this many bytes. Default: 10000.
    pub webhook_max_body_bytes: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_steps_per_sprint: 100,
            max_resumes_per_session: 500,
            max_template_chars: 10000,
            max_field_chars: 640,
            max_result_chars: 640,
            max_urns_per_contact: 100,
            llm_max_tokens: 2500,
            webhook_timeout: Duration::from_secs(15),
            webhook_max_body_bytes: 10000,
        }
    }
}

/// Shared by all sessions; cheap to wrap in an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
    services: Services,
}

impl Engine {
    /// Create a new [`EngineBuilder`].
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let engine = Engine::builder().build().unwrap();
        assert_eq!(engine.options().max_field_chars, 640);
        assert_eq!(engine.options().llm_max_tokens, 2500);
        assert_eq!(engine.options().webhook_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_options() {
        let err = Engine::builder().max_urns_per_contact(0).build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "build error: max_urns_per_contact must be greater than zero"
        );
    }
}
