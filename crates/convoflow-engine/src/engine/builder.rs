//! Engine builder: collects options and service factories.

use std::sync::Arc;
use std::time::Duration;

use super::error::EngineError;
use super::{Engine, EngineOptions};
use crate::assets::{Classifier, Llm};
use crate::errors::ServiceError;
use crate::services::{
    AirtimeService, ClassificationService, EmailService, LlmService, Services, WebhookService,
};

/// Builder for assembling the [`Engine`].
///
/// All services are optional: actions needing one that isn't configured
/// log an error event and carry on.
pub struct EngineBuilder {
    options: EngineOptions,
    services: Services,
}

impl EngineBuilder {
    pub(super) fn new() -> Self {
        Self {
            options: EngineOptions::default(),
            services: Services::default(),
        }
    }

    /// Replace all options at once.
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_steps_per_sprint(mut self, max: usize) -> Self {
        self.options.max_steps_per_sprint = max;
        self
    }

    pub fn max_resumes_per_session(mut self, max: usize) -> Self {
        self.options.max_resumes_per_session = max;
        self
    }

    pub fn max_template_chars(mut self, max: usize) -> Self {
        self.options.max_template_chars = max;
        self
    }

    pub fn max_field_chars(mut self, max: usize) -> Self {
        self.options.max_field_chars = max;
        self
    }

    pub fn max_result_chars(mut self, max: usize) -> Self {
        self.options.max_result_chars = max;
        self
    }

    pub fn max_urns_per_contact(mut self, max: usize) -> Self {
        self.options.max_urns_per_contact = max;
        self
    }

    pub fn llm_max_tokens(mut self, max: u32) -> Self {
        self.options.llm_max_tokens = max;
        self
    }

    pub fn webhook_timeout(mut self, timeout: Duration) -> Self {
        self.options.webhook_timeout = timeout;
        self
    }

    /// Set the factory for classification services, called per classifier.
    pub fn classification_service<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Classifier) -> Result<Arc<dyn ClassificationService>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.services.classification = Some(Arc::new(factory));
        self
    }

    /// Set the factory for LLM services, called per LLM asset.
    pub fn llm_service<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Llm) -> Result<Arc<dyn LlmService>, ServiceError> + Send + Sync + 'static,
    {
        self.services.llm = Some(Arc::new(factory));
        self
    }

    pub fn airtime_service<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn AirtimeService>, ServiceError> + Send + Sync + 'static,
    {
        self.services.airtime = Some(Arc::new(factory));
        self
    }

    /// Set the factory for webhook services, called with the configured timeout.
    pub fn webhook_service<F>(mut self, factory: F) -> Self
    where
        F: Fn(Duration) -> Result<Arc<dyn WebhookService>, ServiceError> + Send + Sync + 'static,
    {
        self.services.webhook = Some(Arc::new(factory));
        self
    }

    pub fn email_service<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmailService>, ServiceError> + Send + Sync + 'static,
    {
        self.services.email = Some(Arc::new(factory));
        self
    }

    /// Build the engine, checking options are usable.
    pub fn build(self) -> Result<Engine, EngineError> {
        let checks = [
            ("max_field_chars", self.options.max_field_chars),
            ("max_result_chars", self.options.max_result_chars),
            ("max_urns_per_contact", self.options.max_urns_per_contact),
            ("max_template_chars", self.options.max_template_chars),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(EngineError::Build {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }
        if self.options.webhook_timeout.is_zero() {
            return Err(EngineError::Build {
                message: "webhook_timeout must be greater than zero".into(),
            });
        }

        tracing::debug!(options = ?self.options, services = ?self.services, "engine built");

        Ok(Engine {
            options: self.options,
            services: self.services,
        })
    }
}
