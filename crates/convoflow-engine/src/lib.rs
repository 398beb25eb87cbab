//! Convoflow — the execution core of conversational automation flows.
//!
//! This crate provides the actions a flow runs, the modifiers they apply to
//! contacts and the typed events that record everything that happened.
//! Events can be replayed to rebuild state without any I/O, and every
//! definition can be inspected for the assets, locals and results it uses.
//!
//! The crate has no HTTP or storage dependencies. Services that actions call
//! out to are traits in [`services`]; HTTP implementations live in the
//! `convoflow-services` crate.

pub mod actions;
pub mod assets;
pub mod engine;
pub mod errors;
pub mod events;
pub mod missing;
pub mod modifiers;
pub mod query;
pub mod run;
pub mod services;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export public types at the crate level.

// actions
pub use actions::{
    execute, inspect, read_action, validate_dependencies, Action, ActionRegistry, Inspection,
    ACTION_TYPES,
};

// assets
pub use assets::{AssetsSource, SessionAssets};

// engine
pub use engine::{Engine, EngineBuilder, EngineError, EngineOptions};

// errors
pub use errors::{ActionError, ApplyError, QueryError, ReadError, ServiceError};

// events
pub use events::{read_event, Event, EventKind, EventRegistry, Origin};

// missing
pub use missing::{ignore_missing, MissingCallback};

// modifiers
pub use modifiers::{read_modifier, reevaluate_groups, Modifier, ModifierRegistry, ReadOutcome};

// run
pub use run::{
    Call, EventCallback, Locals, ModifierCallback, Run, RunStatus, Session, SessionHistory, Step,
};

// services
pub use services::{
    AirtimeService, ClassificationService, EmailService, LlmService, Services, WebhookRequest,
    WebhookService,
};

// types
pub use types::{AssetReference, Contact, Environment, MsgIn, MsgOut, Urn};
