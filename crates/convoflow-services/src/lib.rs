//! HTTP-backed service adapters for convoflow-engine.
//!
//! Each adapter implements one of the engine's service traits and is
//! plugged in through the matching [`EngineBuilder`] factory:
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .webhook_service(|timeout| Ok(Arc::new(HttpWebhookService::new(timeout)?)))
//!     .email_service(move || Ok(Arc::new(RelayEmailService::new(client.clone(), relay_url.clone()))))
//!     .build()?;
//! ```
//!
//! [`EngineBuilder`]: convoflow_engine::EngineBuilder

pub mod airtime;
pub mod classifier;
pub mod email;
pub mod llm;
mod trace;
pub mod webhook;

pub use airtime::DtOneAirtime;
pub use classifier::WitClassifier;
pub use email::RelayEmailService;
pub use llm::OpenAiCompatibleLlm;
pub use trace::REDACTION_MASK;
pub use webhook::HttpWebhookService;
