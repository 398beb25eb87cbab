//! Value types shared by actions, events and modifiers.
//!
//! Maps are `BTreeMap` so serialized output is deterministic and fixtures
//! compare byte for byte.

pub mod contact;
pub mod environment;
pub mod localization;
pub mod msg;
pub mod reference;
pub mod results;
pub mod ticket;
pub mod urn;
pub mod value;
pub mod webhook;

pub use contact::{Contact, ContactEnvelope, ContactStatus, Destination, GroupList};
pub use environment::{
    is_valid_language, locale, parse_timezone, DateFormat, Environment, NumberFormat,
    RedactionPolicy,
};
pub use localization::Localization;
pub use msg::{
    is_valid_attachment, BroadcastTranslation, MsgContent, MsgIn, MsgOut, MsgTopic, QuickReply,
    Templating, TemplatingComponent, TemplatingVariable, UnsendableReason, MAX_ATTACHMENT_LENGTH,
    MAX_QUICK_REPLY_LENGTH,
};
pub use reference::{
    AssetReference, ChannelReference, ClassifierReference, ContactReference, FieldReference,
    FlowReference, GroupReference, LabelReference, LlmReference, OptInReference,
    TemplateReference, TopicReference, UserReference,
};
pub use results::{
    is_valid_result_name, result_key, ResultInfo, Results, RunResult, CATEGORY_FAILURE,
    CATEGORY_SKIPPED, CATEGORY_SUCCESS, RESULT_EXTRA_MAX_BYTES,
};
pub use ticket::{Ticket, TicketList, TicketStatus};
pub use urn::{is_known_scheme, parse_phone_number, Urn, UrnError};
pub use value::{parse_datetime, parse_number, FieldType, FieldValue};
pub use webhook::{
    truncate_chars, truncate_ellipsis, CallStatus, HttpLog, WebhookCall, MAX_TRACE_BYTES,
};
