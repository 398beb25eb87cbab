//! Test utilities for executing actions and modifiers without an interpreter.
//!
//! ```ignore
//! let mut run = TestSession::builder()
//!     .input(test_support::msg_in("hi there"))
//!     .build_run();
//!
//! execute(action.as_ref(), &mut run, &step, &mut |_: Modifier| {}, &mut |e: Event| events.push(e)).await?;
//!
//! assert_eq!(run.results().get("intent").unwrap().category, "Success");
//! ```
//!
//! The session comes with [`default_assets`] and [`default_contact`]. Templates
//! are evaluated by a small `@path` resolver covering the contact, fields,
//! results, locals, input, webhook, run and URNs.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use regex::{Captures, Regex};
use serde_json::{json, Number, Value};
use uuid::Uuid;

use crate::assets::{Flow, FlowType, SessionAssets};
use crate::engine::Engine;
use crate::errors::ServiceError;
use crate::run::{Call, EventCallback, Locals, Run, RunStatus, Session, SessionHistory};
use crate::services::{
    AirtimeError, AirtimeService, AirtimeTransfer, Classification, ClassificationService,
    EmailService, ExtractedIntent, LlmResponse, LlmService, WebhookRequest, WebhookService,
};
use crate::types::{
    CallStatus, ChannelReference, Contact, Environment, HttpLog, MsgIn, Results, RunResult, Urn,
    WebhookCall,
};

// -- Fixture identifiers ------------------------------------------------------

pub const CONTACT_UUID: Uuid = Uuid::from_u128(0x5d76d86b_3bb9_4d5a_b822_c9d86f5d8e4f);
pub const SEND_CHANNEL_UUID: Uuid = Uuid::from_u128(0x57f1078f_88aa_46f4_a59a_948a5739c03d);
pub const RECEIVE_CHANNEL_UUID: Uuid = Uuid::from_u128(0x8e21f093_99aa_413b_b55b_758b54308fcb);
pub const TESTERS_UUID: Uuid = Uuid::from_u128(0xb7cf0d83_f1c9_411c_96fd_c511a4cfa86d);
pub const PARENT_FLOW_UUID: Uuid = Uuid::from_u128(0x50c3706e_fbfd_4f2b_a1a4_4eb2c1f7bf3e);
const CALL_UUID: Uuid = Uuid::from_u128(0x0198ab4f_8b6c_4b1e_9d3a_6a4e2f5c7d10);

const SEND_CHANNEL_NAME: &str = "Nexmo";
const CONTACT_PHONE: &str = "tel:+250788123123";

/// Assets every test session starts with.
pub fn default_assets() -> Arc<SessionAssets> {
    let assets =
        SessionAssets::from_json(&default_assets_json()).expect("default assets should be valid");
    Arc::new(assets)
}

/// Source of [`default_assets`], for tests that need to change a part of it.
pub fn default_assets_json() -> Value {
    json!({
        "channels": [
            {
                "uuid": SEND_CHANNEL_UUID,
                "name": SEND_CHANNEL_NAME,
                "address": "+250788000001",
                "schemes": ["tel", "twitter"],
                "roles": ["send", "receive"],
                "country": "RW",
                "features": ["optins"]
            },
            {
                "uuid": RECEIVE_CHANNEL_UUID,
                "name": "Receive Only",
                "address": "+250788000002",
                "schemes": ["tel"],
                "roles": ["receive"]
            }
        ],
        "classifiers": [
            {
                "uuid": "1c06c884-39dd-4ce4-ad9f-9a01cbe6c000",
                "name": "Booking",
                "type": "wit",
                "intents": ["book_flight", "book_hotel"]
            }
        ],
        "fields": [
            {"uuid": "d66a7823-eada-40e5-9a3a-57239d4690bf", "key": "gender", "name": "Gender", "type": "text"},
            {"uuid": "f1b5aea6-6586-41c7-9020-1a6326cc6565", "key": "age", "name": "Age", "type": "number"}
        ],
        "flows": [
            {"uuid": PARENT_FLOW_UUID, "name": "Parent Flow", "type": "messaging"},
            {"uuid": "a8d27b94-d3d0-4a96-8074-0f162f342195", "name": "Child Flow", "type": "messaging"},
            {"uuid": "ece0e6a2-7a8f-4c2e-9a55-1b7a8b6e4f3d", "name": "Voice Flow", "type": "voice"}
        ],
        "groups": [
            {"uuid": TESTERS_UUID, "name": "Testers"},
            {"uuid": "4f1f98fc-27a7-4a69-bbdb-24744ba739a9", "name": "Males", "query": "gender = male"}
        ],
        "llms": [
            {"uuid": "14115c03-b4c5-49e2-b9ac-390c43e9d7ce", "name": "GPT", "type": "openai", "model": "gpt-4o"}
        ],
        "optins": [
            {"uuid": "248be71d-78e9-4d71-a6c4-9981d369e5cb", "name": "Joke Of The Day"}
        ],
        "resthooks": [
            {
                "slug": "new-registration",
                "subscribers": ["http://example.com/sub1", "http://example.com/sub2"]
            }
        ],
        "templates": [
            {
                "uuid": "9c22b594-fcab-4b29-9bcb-ce4404894a80",
                "name": "greeting",
                "translations": [
                    {
                        "channel": {"uuid": SEND_CHANNEL_UUID, "name": SEND_CHANNEL_NAME},
                        "locale": "eng-RW",
                        "namespace": "",
                        "components": [
                            {"type": "body", "name": "body", "content": "Hello {{1}}", "variables": {"1": 0}}
                        ],
                        "variables": [{"type": "text"}]
                    }
                ]
            }
        ],
        "topics": [
            {"uuid": "0d9a2c56-6fc2-4f27-93c5-a6322e26b740", "name": "General"}
        ],
        "users": [
            {"uuid": "0c78ef47-7d56-44d8-8f57-96e0f30e8f44", "email": "bob@nyaruka.com", "name": "Bob"}
        ]
    })
}

/// Ryan Lewis: speaks English, reachable by phone and twitter, in Testers.
pub fn default_contact() -> Contact {
    let assets = default_assets();
    let mut contact = Contact::new(CONTACT_UUID, "Ryan Lewis", Utc::now());
    contact.set_language(Some("eng".to_string()));
    contact.add_urn(Urn::from(CONTACT_PHONE));
    contact.add_urn(Urn::from("twitter:ryan_lewis"));
    if let Some(testers) = assets.groups().get(TESTERS_UUID) {
        contact.groups_mut().add(testers);
    }
    contact
}

/// An incoming message from the default contact on the send channel.
pub fn msg_in(text: &str) -> MsgIn {
    MsgIn {
        uuid: Uuid::new_v4(),
        urn: Some(Urn::from(CONTACT_PHONE)),
        channel: Some(ChannelReference::new(SEND_CHANNEL_UUID, SEND_CHANNEL_NAME)),
        text: text.to_string(),
        attachments: Vec::new(),
    }
}

/// The call used by voice sessions. Always the same call.
pub fn voice_call() -> Call {
    Call {
        uuid: CALL_UUID,
        channel: ChannelReference::new(SEND_CHANNEL_UUID, SEND_CHANNEL_NAME),
        urn: Urn::from(CONTACT_PHONE),
    }
}

fn default_environment() -> Environment {
    Environment {
        allowed_languages: vec!["eng".to_string(), "fra".to_string()],
        default_country: Some("RW".to_string()),
        ..Environment::default()
    }
}

// -- Session ------------------------------------------------------------------

pub struct TestSession {
    uuid: Uuid,
    session_type: FlowType,
    engine: Arc<Engine>,
    assets: Arc<SessionAssets>,
    environment: Environment,
    contact: Option<Contact>,
    call: Option<Call>,
    input: Option<MsgIn>,
    history: SessionHistory,
    batch_start: bool,
    flow_stack: Vec<Arc<Flow>>,
}

impl TestSession {
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }
}

impl Session for TestSession {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn session_type(&self) -> FlowType {
        self.session_type
    }

    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn assets(&self) -> &Arc<SessionAssets> {
        &self.assets
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn set_environment(&mut self, env: Environment) {
        self.environment = env;
    }

    fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    fn contact_mut(&mut self) -> Option<&mut Contact> {
        self.contact.as_mut()
    }

    fn set_contact(&mut self, contact: Contact) {
        self.contact = Some(contact);
    }

    fn call(&self) -> Option<&Call> {
        self.call.as_ref()
    }

    fn input(&self) -> Option<&MsgIn> {
        self.input.as_ref()
    }

    fn history(&self) -> &SessionHistory {
        &self.history
    }

    fn batch_start(&self) -> bool {
        self.batch_start
    }

    fn flow_stack(&self) -> Vec<Uuid> {
        self.flow_stack.iter().map(|f| f.uuid).collect()
    }

    fn push_flow(&mut self, flow: Arc<Flow>, _parent_run: Uuid, terminal: bool) {
        if terminal {
            self.flow_stack.pop();
        }
        self.flow_stack.push(flow);
    }
}

#[derive(Default)]
pub struct TestSessionBuilder {
    engine: Option<Engine>,
    assets: Option<Arc<SessionAssets>>,
    contact: Option<Contact>,
    no_contact: bool,
    call: Option<Call>,
    input: Option<MsgIn>,
    history: SessionHistory,
    batch_start: bool,
}

impl TestSessionBuilder {
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replaces the default assets. They must still include "Parent Flow".
    pub fn assets(mut self, assets: Arc<SessionAssets>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Session without a contact, as for some background flows.
    pub fn without_contact(mut self) -> Self {
        self.no_contact = true;
        self
    }

    /// Makes this a voice session over the given call.
    pub fn call(mut self, call: Call) -> Self {
        self.call = Some(call);
        self
    }

    pub fn input(mut self, input: MsgIn) -> Self {
        self.input = Some(input);
        self
    }

    pub fn history(mut self, history: SessionHistory) -> Self {
        self.history = history;
        self
    }

    pub fn batch_start(mut self, batch_start: bool) -> Self {
        self.batch_start = batch_start;
        self
    }

    /// Builds the session with a run of "Parent Flow" on it.
    pub fn build_run(self) -> TestRun {
        let assets = self.assets.unwrap_or_else(default_assets);
        let flow = assets
            .flows()
            .get(PARENT_FLOW_UUID)
            .expect("default assets include the parent flow");

        let contact = if self.no_contact {
            None
        } else {
            Some(self.contact.unwrap_or_else(default_contact))
        };

        let session = TestSession {
            uuid: Uuid::new_v4(),
            session_type: FlowType::Messaging,
            engine: Arc::new(self.engine.unwrap_or_default()),
            assets,
            environment: default_environment(),
            contact,
            call: self.call,
            input: self.input,
            history: self.history,
            batch_start: self.batch_start,
            flow_stack: vec![flow.clone()],
        };

        TestRun {
            uuid: Uuid::new_v4(),
            flow,
            session,
            locals: Locals::default(),
            results: Results::default(),
            webhook: None,
            status: RunStatus::Active,
        }
    }
}

// -- Run ----------------------------------------------------------------------

const EXPRESSION_ROOTS: &[&str] = &[
    "contact", "fields", "results", "locals", "input", "webhook", "run", "urns",
];

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([a-z_]+(?:\.[a-z0-9_]+)*)").expect("valid regex"));

pub struct TestRun {
    uuid: Uuid,
    flow: Arc<Flow>,
    session: TestSession,
    locals: Locals,
    results: Results,
    webhook: Option<WebhookCall>,
    status: RunStatus,
}

impl TestRun {
    /// Value of an `@path` expression, empty if it isn't set.
    fn resolve(&self, path: &str) -> String {
        let contact = self.session.contact.as_ref();
        let field = |key: &str| {
            contact
                .and_then(|c| c.field(key))
                .map(|v| v.text.clone())
                .unwrap_or_default()
        };
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["contact"] | ["contact", "name"] => {
                contact.map(|c| c.name().to_string()).unwrap_or_default()
            }
            ["contact", "uuid"] => contact.map(|c| c.uuid().to_string()).unwrap_or_default(),
            ["contact", "language"] => contact
                .and_then(|c| c.language())
                .unwrap_or_default()
                .to_string(),
            ["contact", "fields", key] | ["fields", key] => field(*key),
            ["results", key] | ["results", key, "value"] => self
                .results
                .get(*key)
                .map(|r| r.value.clone())
                .unwrap_or_default(),
            ["results", key, "category"] => self
                .results
                .get(*key)
                .map(|r| r.category.clone())
                .unwrap_or_default(),
            ["locals", key] => self.locals.get(*key).to_string(),
            ["input"] | ["input", "text"] => self
                .session
                .input
                .as_ref()
                .map(|i| i.text.clone())
                .unwrap_or_default(),
            ["webhook"] => self
                .webhook
                .as_ref()
                .map(|w| String::from_utf8_lossy(&w.response_body).into_owned())
                .unwrap_or_default(),
            ["webhook", "status"] => self
                .webhook
                .as_ref()
                .and_then(|w| w.response_status)
                .map(|s| s.to_string())
                .unwrap_or_default(),
            ["run", "uuid"] => self.uuid.to_string(),
            ["run", "status"] => self.status.to_string(),
            ["urns", scheme] => contact
                .and_then(|c| c.urns().iter().find(|u| u.scheme() == *scheme))
                .map(|u| u.identity().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

impl Run for TestRun {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    fn session(&self) -> &dyn Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        &mut self.session
    }

    fn evaluate_template(&self, template: &str, _log: &mut EventCallback<'_>) -> (String, bool) {
        let evaluated = EXPRESSION.replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            let root = path.split('.').next().unwrap_or_default();
            if EXPRESSION_ROOTS.contains(&root) {
                self.resolve(path)
            } else {
                caps[0].to_string()
            }
        });
        (evaluated.into_owned(), true)
    }

    fn get_text_array(
        &self,
        _item: Uuid,
        _property: &str,
        native: &[String],
        _languages: &[String],
    ) -> (Vec<String>, Option<String>) {
        (native.to_vec(), None)
    }

    fn locals(&self) -> &Locals {
        &self.locals
    }

    fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    fn results(&self) -> &Results {
        &self.results
    }

    fn set_result(&mut self, result: RunResult) -> (Option<RunResult>, bool) {
        self.results.save(result)
    }

    fn webhook(&self) -> Option<&WebhookCall> {
        self.webhook.as_ref()
    }

    fn set_webhook(&mut self, call: Option<WebhookCall>) {
        self.webhook = call;
    }

    fn status(&self) -> RunStatus {
        self.status
    }

    fn exit(&mut self, status: RunStatus) {
        self.status = status;
    }
}

// -- Mock services ------------------------------------------------------------

fn mock_log(url: &str, request: &str, response: &str) -> HttpLog {
    HttpLog {
        url: url.to_string(),
        status_code: Some(200),
        status: CallStatus::Success,
        request: request.to_string(),
        response: response.to_string(),
        elapsed_ms: 1,
        retries: 0,
        created_on: Utc::now(),
    }
}

/// Canned responses by URL. Unknown URLs get a 404, a `None` status is a
/// connection error.
#[derive(Default)]
pub struct MockWebhook {
    responses: BTreeMap<String, (Option<u16>, String)>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl MockWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: Option<u16>, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl WebhookService for MockWebhook {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookCall, ServiceError> {
        let (status, body) = self
            .responses
            .get(&request.url)
            .cloned()
            .unwrap_or((Some(404), String::new()));

        let call = WebhookCall {
            url: request.url.clone(),
            method: request.method.clone(),
            request_trace: format!("{} {} HTTP/1.1\r\n\r\n{}", request.method, request.url, request.body),
            response_trace: status
                .map(|s| format!("HTTP/1.1 {s}\r\n\r\n"))
                .unwrap_or_default(),
            response_status: status,
            response_body: if status.is_some() {
                body.into_bytes()
            } else {
                Vec::new()
            },
            elapsed_ms: 1,
            retries: 0,
        };
        self.requests.lock().push(request);
        Ok(call)
    }
}

/// Always finds the same intent.
pub struct MockClassifier {
    intent: String,
    confidence: f64,
}

impl MockClassifier {
    pub fn new(intent: &str, confidence: f64) -> Self {
        Self {
            intent: intent.to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl ClassificationService for MockClassifier {
    async fn classify(
        &self,
        _env: &Environment,
        input: &str,
        logs: &mut Vec<HttpLog>,
    ) -> Result<Classification, ServiceError> {
        let response = json!({"intents": [{"name": self.intent, "confidence": self.confidence}]});
        logs.push(mock_log(
            "https://classifier.test/message",
            &format!("GET /message?q={input}"),
            &response.to_string(),
        ));
        Ok(Classification {
            intents: vec![ExtractedIntent {
                name: self.intent.clone(),
                confidence: self.confidence,
            }],
            entities: BTreeMap::new(),
        })
    }
}

/// Always answers with the same output.
pub struct MockLlm {
    output: String,
}

impl MockLlm {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
        }
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn response(
        &self,
        _env: &Environment,
        _instructions: &str,
        _input: &str,
        _max_tokens: u32,
    ) -> Result<LlmResponse, ServiceError> {
        Ok(LlmResponse {
            output: self.output.clone(),
            tokens_used: 42,
        })
    }
}

/// Transfers the full amount of the first currency offered.
#[derive(Default)]
pub struct MockAirtime {
    transfers: Mutex<Vec<AirtimeTransfer>>,
}

impl MockAirtime {
    pub const EXTERNAL_ID: &'static str = "98765432";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfers(&self) -> Vec<AirtimeTransfer> {
        self.transfers.lock().clone()
    }
}

#[async_trait]
impl AirtimeService for MockAirtime {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Number>,
        logs: &mut Vec<HttpLog>,
    ) -> Result<AirtimeTransfer, AirtimeError> {
        let Some((currency, amount)) = amounts.iter().next() else {
            return Err(AirtimeError {
                error: ServiceError::Request {
                    message: "no amounts to transfer".into(),
                },
                transfer: None,
            });
        };
        logs.push(mock_log(
            "https://airtime.test/transfers",
            &format!("POST /transfers {currency} {amount}"),
            &json!({"id": Self::EXTERNAL_ID}).to_string(),
        ));

        let transfer = AirtimeTransfer {
            uuid: Uuid::new_v4(),
            external_id: Self::EXTERNAL_ID.to_string(),
            sender: sender.cloned(),
            recipient: recipient.clone(),
            currency: currency.clone(),
            desired_amount: amount.clone(),
            actual_amount: amount.clone(),
        };
        self.transfers.lock().push(transfer.clone());
        Ok(transfer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub addresses: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records emails instead of sending them.
#[derive(Default)]
pub struct MockEmail {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailService for MockEmail {
    async fn send(&self, addresses: &[String], subject: &str, body: &str) -> Result<(), ServiceError> {
        self.sent.lock().push(SentEmail {
            addresses: addresses.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    #[test]
    fn test_evaluate_template() {
        let mut run = TestSession::builder()
            .input(msg_in("yes please"))
            .build_run();
        run.locals_mut().set("count", "3");

        let mut log = |_: Event| {};
        let (text, ok) = run.evaluate_template(
            "@contact.name said @input.text (@locals.count) to bob@nyaruka.com.",
            &mut log,
        );
        assert!(ok);
        assert_eq!(text, "Ryan Lewis said yes please (3) to bob@nyaruka.com.");

        let (text, _) = run.evaluate_template("@fields.missing|@urns.tel", &mut log);
        assert_eq!(text, "|tel:+250788123123");
    }

    #[test]
    fn test_push_flow() {
        let mut run = TestSession::builder().build_run();
        let child = run.session().assets().flows().find_by_name("Child Flow").unwrap();
        let parent_run = run.uuid();

        run.session_mut().push_flow(child.clone(), parent_run, false);
        assert_eq!(run.session().flow_stack(), vec![PARENT_FLOW_UUID, child.uuid]);

        run.session_mut().push_flow(child.clone(), parent_run, true);
        assert_eq!(run.session().flow_stack().len(), 2);
    }
}
