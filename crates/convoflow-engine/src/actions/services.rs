//! Actions which call external services: classifiers, LLMs, airtime
//! transfers and email.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::base::{languages, save_result, validate_result_name};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::{AirtimeTransferred, EmailSent, Event, LlmCalled, ServiceCalled};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::services::AirtimeTransfer;
use crate::types::urn::{TEL_SCHEME, WHATSAPP_SCHEME};
use crate::types::{
    AssetReference, ClassifierReference, HttpLog, LlmReference, ResultInfo, Urn, CATEGORY_FAILURE, CATEGORY_SKIPPED, CATEGORY_SUCCESS,
};

const CLASSIFICATION_CATEGORIES: &[&str] = &[CATEGORY_SUCCESS, CATEGORY_SKIPPED, CATEGORY_FAILURE];
const TRANSFER_CATEGORIES: &[&str] = &[CATEGORY_SUCCESS, CATEGORY_FAILURE];

// ---------------------------------------------------------------------------
// call_classifier
// ---------------------------------------------------------------------------

/// Classifies the evaluated input with a classifier and saves the top
/// intent as a result, with the full classification as its extra.
///
/// ```json
/// {
///   "type": "call_classifier",
///   "uuid": "...",
///   "classifier": {"uuid": "1c06c884-39dd-4ce4-ad9f-9a01cbe6c000", "name": "Booking"},
///   "input": "@input.text",
///   "result_name": "Intent"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallClassifier {
    #[serde(flatten)]
    pub base: ActionBase,
    pub classifier: ClassifierReference,
    pub input: String,
    pub result_name: String,
}

impl CallClassifier {
    #[allow(clippy::too_many_arguments)]
    fn save(
        &self,
        run: &mut dyn Run,
        step: &Step,
        input: &str,
        value: &str,
        category: &str,
        extra: Option<Value>,
        log: &mut EventCallback<'_>,
    ) {
        let input = Some(input.to_string());
        save_result(run, step, &self.result_name, value, category, "", input, extra, log);
    }
}

#[async_trait]
impl Action for CallClassifier {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        validate_result_name(&self.result_name)
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let (input, _) = run.evaluate_template(&self.input, log_event);

        if input.is_empty() {
            log_event(Event::error(
                "can't classify empty input, skipping classification",
            ));
            self.save(run, step, &input, "0", CATEGORY_SKIPPED, None, log_event);
            return Ok(());
        }

        let Some(classifier) = run.session().assets().classifiers().get(self.classifier.uuid) else {
            log_event(Event::dependency_error(&AssetReference::Classifier(
                self.classifier.clone(),
            )));
            self.save(run, step, &input, "0", CATEGORY_FAILURE, None, log_event);
            return Ok(());
        };

        let service = match run.session().engine().services().classification(&classifier) {
            Ok(service) => service,
            Err(e) => {
                log_event(Event::error(e));
                self.save(run, step, &input, "0", CATEGORY_FAILURE, None, log_event);
                return Ok(());
            }
        };

        let env = run.session().merged_environment();
        let mut logs: Vec<HttpLog> = Vec::new();
        let outcome = service.classify(&env, &input, &mut logs).await;

        if !logs.is_empty() {
            log_event(Event::new(ServiceCalled::classifier(
                classifier.reference(),
                logs,
            )));
        }

        match outcome {
            Ok(classification) => {
                let value = classification
                    .intents
                    .first()
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                let extra = serde_json::to_value(&classification).ok();
                self.save(run, step, &input, &value, CATEGORY_SUCCESS, extra, log_event);
            }
            Err(e) => {
                tracing::warn!(classifier = %classifier.uuid, error = %e, "classification failed");
                log_event(Event::error(e));
                self.save(run, step, &input, "0", CATEGORY_FAILURE, None, log_event);
            }
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Classifier(self.classifier.clone()));
        if !self.result_name.is_empty() {
            result(ResultInfo::new(&self.result_name, CLASSIFICATION_CATEGORIES));
        }
    }
}

// ---------------------------------------------------------------------------
// call_llm
// ---------------------------------------------------------------------------

/// Local holding `success` or `failure` after an LLM call.
pub const LLM_STATUS_LOCAL: &str = "_llm_status";

fn default_output_local() -> String {
    "_llm_output".to_string()
}

/// Asks an LLM to apply instructions to the evaluated input. The response
/// goes into a run local, empty if the call failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLlm {
    #[serde(flatten)]
    pub base: ActionBase,
    pub llm: LlmReference,
    pub instructions: String,
    pub input: String,
    #[serde(default = "default_output_local")]
    pub output_local: String,
}

#[async_trait]
impl Action for CallLlm {
    impl_base!();

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let output = call_llm(self, run, log_event).await;

        let locals = run.locals_mut();
        match output {
            Some(output) => {
                locals.set(LLM_STATUS_LOCAL, "success");
                locals.set(&self.output_local, output);
            }
            None => {
                locals.set(LLM_STATUS_LOCAL, "failure");
                locals.set(&self.output_local, "");
            }
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        local: &mut LocalCallback<'_>,
        _result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Llm(self.llm.clone()));
        local(LLM_STATUS_LOCAL);
        local(&self.output_local);
    }
}

async fn call_llm(action: &CallLlm, run: &mut dyn Run, log: &mut EventCallback<'_>) -> Option<String> {
    let Some(llm) = run.session().assets().llms().get(action.llm.uuid) else {
        log(Event::dependency_error(&AssetReference::Llm(action.llm.clone())));
        return None;
    };

    let (instructions, _) = run.evaluate_template(&action.instructions, log);
    let (input, _) = run.evaluate_template(&action.input, log);

    let engine = run.session().engine().clone();
    let service = match engine.services().llm(&llm) {
        Ok(service) => service,
        Err(e) => {
            log(Event::error(e));
            return None;
        }
    };
    let env = run.session().merged_environment();

    let start = Instant::now();
    let response = match service
        .response(&env, &instructions, &input, engine.options().llm_max_tokens)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(llm = %llm.uuid, error = %e, "LLM call failed");
            log(Event::error(e));
            return None;
        }
    };

    log(Event::new(LlmCalled {
        llm: llm.reference(),
        instructions,
        input,
        output: response.output.clone(),
        tokens_used: response.tokens_used,
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }));
    Some(response.output)
}

// ---------------------------------------------------------------------------
// transfer_airtime
// ---------------------------------------------------------------------------

/// Sends airtime to the contact's phone number, in whichever of the given
/// currencies their operator supports.
///
/// ```json
/// {
///   "type": "transfer_airtime",
///   "uuid": "...",
///   "amounts": {"RWF": 500, "USD": 0.5},
///   "result_name": "Reward Transfer"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAirtime {
    #[serde(flatten)]
    pub base: ActionBase,
    pub amounts: BTreeMap<String, Number>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_name: String,
}

#[async_trait]
impl Action for TransferAirtime {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        validate_result_name(&self.result_name)
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        if run.contact().is_none() {
            return Ok(());
        }

        let transfer = transfer(self, run, log_event).await;

        if !self.result_name.is_empty() {
            let (value, category) = match &transfer {
                Some(t) => (t.external_id.as_str(), CATEGORY_SUCCESS),
                None => ("", CATEGORY_FAILURE),
            };
            save_result(run, step, &self.result_name, value, category, "", None, None, log_event);
        }
        Ok(())
    }

    fn inspect(
        &self,
        _dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        if !self.result_name.is_empty() {
            result(ResultInfo::new(&self.result_name, TRANSFER_CATEGORIES));
        }
    }
}

/// The recipient and, if the contact's preferred channel can send to it,
/// the sender.
fn transfer_parties(run: &dyn Run) -> Option<(Option<Urn>, Urn)> {
    let contact = run.contact()?;
    let recipient = contact
        .urns()
        .iter()
        .find(|u| u.scheme() == TEL_SCHEME || u.scheme() == WHATSAPP_SCHEME)?
        .identity();

    let sender = contact
        .preferred_channel(run.session().assets())
        .filter(|c| c.supports_scheme(recipient.scheme()) && !c.address.is_empty())
        .map(|c| Urn::from_raw(format!("{}:{}", recipient.scheme(), c.address)));
    Some((sender, recipient))
}

async fn transfer(
    action: &TransferAirtime,
    run: &mut dyn Run,
    log: &mut EventCallback<'_>,
) -> Option<AirtimeTransfer> {
    let Some((sender, recipient)) = transfer_parties(run) else {
        log(Event::error(
            "can't transfer airtime to contact without a phone number",
        ));
        return None;
    };

    let service = match run.session().engine().services().airtime() {
        Ok(service) => service,
        Err(e) => {
            log(Event::error(e));
            return None;
        }
    };

    let mut logs: Vec<HttpLog> = Vec::new();
    let outcome = service
        .transfer(sender.as_ref(), &recipient, &action.amounts, &mut logs)
        .await;

    let (transfer, error) = match outcome {
        Ok(transfer) => (Some(transfer), None),
        Err(e) => (e.transfer, Some(e.error)),
    };

    if let Some(t) = &transfer {
        log(Event::new(AirtimeTransferred {
            transfer_uuid: t.uuid,
            external_id: t.external_id.clone(),
            sender: t.sender.clone(),
            recipient: t.recipient.clone(),
            currency: t.currency.clone(),
            amount: t.actual_amount.clone(),
            http_logs: logs,
        }));
    }

    match error {
        Some(e) => {
            tracing::warn!(recipient = %recipient.as_str(), error = %e, "airtime transfer failed");
            log(Event::error(e));
            None
        }
        None => transfer,
    }
}

// ---------------------------------------------------------------------------
// send_email
// ---------------------------------------------------------------------------

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Sends an email. The subject is collapsed onto a single line.
///
/// ```json
/// {
///   "type": "send_email",
///   "uuid": "...",
///   "addresses": ["@urns.mailto"],
///   "subject": "Here is your activation token",
///   "body": "Your activation token is @contact.fields.activation_token"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmail {
    #[serde(flatten)]
    pub base: ActionBase,
    pub addresses: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
impl Action for SendEmail {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if self.addresses.is_empty() {
            return Err(ReadError::validation("must specify at least one address"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        _step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let languages = languages(run);

        let localized = run.get_text(self.base.uuid, "subject", &self.subject, &languages);
        let (subject, _) = run.evaluate_template(&localized, log_event);
        let subject = WHITESPACE.replace_all(&subject, " ").trim().to_string();
        if subject.is_empty() {
            log_event(Event::error("email subject evaluated to empty string, skipping"));
            return Ok(());
        }

        let localized = run.get_text(self.base.uuid, "body", &self.body, &languages);
        let (body, _) = run.evaluate_template(&localized, log_event);
        if body.is_empty() {
            log_event(Event::error("email body evaluated to empty string, skipping"));
            return Ok(());
        }

        let mut addresses = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            let (evaluated, _) = run.evaluate_template(address, log_event);
            if evaluated.is_empty() {
                log_event(Event::error("email address evaluated to empty string, skipping"));
                continue;
            }
            let evaluated = evaluated.strip_prefix("mailto:").unwrap_or(&evaluated);
            addresses.push(evaluated.to_string());
        }
        if addresses.is_empty() {
            return Ok(());
        }

        let service = match run.session().engine().services().email() {
            Ok(service) => service,
            Err(e) => {
                log_event(Event::error(e));
                return Ok(());
            }
        };

        match service.send(&addresses, &subject, &body).await {
            Ok(()) => log_event(Event::new(EmailSent {
                to: addresses,
                subject,
                body,
            })),
            Err(e) => log_event(Event::error(format!("unable to send email: {e}"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{execute, read_action};
    use crate::engine::Engine;
    use crate::events::EventKind;
    use crate::modifiers::Modifier;
    use crate::services::{
        AirtimeService, ClassificationService, EmailService, LlmService,
    };
    use crate::test_support::{
        MockAirtime, MockClassifier, MockEmail, MockLlm, TestRun, TestSession,
    };
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn run_action(run: &mut TestRun, data: Value) -> Vec<Event> {
        let action = read_action(&data).unwrap();
        let mut events = Vec::new();
        execute(
            action.as_ref(),
            run,
            &Step::new(Uuid::new_v4()),
            &mut |_: Modifier| {},
            &mut |e: Event| events.push(e),
        )
        .await
        .unwrap();
        events
    }

    fn error_texts(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Error(err) => Some(err.text.clone()),
                _ => None,
            })
            .collect()
    }

    fn types(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.type_name()).collect()
    }

    fn classifier_json(run: &TestRun) -> Value {
        let booking = run
            .session()
            .assets()
            .classifiers()
            .find_by_name("Booking")
            .unwrap();
        json!({"uuid": booking.uuid, "name": "Booking"})
    }

    #[tokio::test]
    async fn test_call_classifier() {
        let engine = Engine::builder()
            .classification_service(|_| {
                Ok(Arc::new(MockClassifier::new("book_flight", 0.9)) as Arc<dyn ClassificationService>)
            })
            .build()
            .unwrap();
        let mut run = TestSession::builder()
            .engine(engine)
            .input(crate::test_support::msg_in("I'd like to book a flight"))
            .build_run();
        let classifier = classifier_json(&run);

        let events = run_action(
            &mut run,
            json!({
                "type": "call_classifier",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "classifier": classifier,
                "input": "@input.text",
                "result_name": "Intent"
            }),
        )
        .await;

        assert_eq!(types(&events), vec!["service_called", "run_result_changed"]);
        let result = run.results().get("intent").unwrap();
        assert_eq!(result.value, "book_flight");
        assert_eq!(result.category, "Success");
        assert_eq!(result.input.as_deref(), Some("I'd like to book a flight"));
        assert_eq!(result.extra.as_ref().unwrap()["intents"][0]["name"], "book_flight");
    }

    #[tokio::test]
    async fn test_call_classifier_empty_input() {
        let mut run = TestSession::builder().build_run();
        let classifier = classifier_json(&run);
        let events = run_action(
            &mut run,
            json!({
                "type": "call_classifier",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "classifier": classifier,
                "input": "@input.text",
                "result_name": "Intent"
            }),
        )
        .await;
        assert_eq!(
            error_texts(&events),
            vec!["can't classify empty input, skipping classification"]
        );
        assert_eq!(run.results().get("intent").unwrap().category, "Skipped");
    }

    #[tokio::test]
    async fn test_call_classifier_missing() {
        let mut run = TestSession::builder()
            .input(crate::test_support::msg_in("hi"))
            .build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "call_classifier",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "classifier": {"uuid": "2d2fb2e5-53bd-4e39-8bbd-73bd2ba27e56", "name": "Deleted"},
                "input": "@input.text",
                "result_name": "Intent"
            }),
        )
        .await;
        assert_eq!(
            error_texts(&events),
            vec!["missing dependency: classifier[uuid=2d2fb2e5-53bd-4e39-8bbd-73bd2ba27e56,name=Deleted]"]
        );
        assert_eq!(run.results().get("intent").unwrap().category, "Failure");
    }

    #[tokio::test]
    async fn test_call_llm() {
        let engine = Engine::builder()
            .llm_service(|_| Ok(Arc::new(MockLlm::new("Bonjour")) as Arc<dyn LlmService>))
            .build()
            .unwrap();
        let mut run = TestSession::builder().engine(engine).build_run();
        let llm = run.session().assets().llms().find_by_name("GPT").unwrap();

        let events = run_action(
            &mut run,
            json!({
                "type": "call_llm",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "llm": {"uuid": llm.uuid, "name": "GPT"},
                "instructions": "Translate to French",
                "input": "Hello"
            }),
        )
        .await;

        assert_eq!(types(&events), vec!["llm_called"]);
        assert_eq!(run.locals().get("_llm_status"), "success");
        assert_eq!(run.locals().get("_llm_output"), "Bonjour");
    }

    #[tokio::test]
    async fn test_call_llm_not_configured() {
        let mut run = TestSession::builder().build_run();
        let llm = run.session().assets().llms().find_by_name("GPT").unwrap();
        let events = run_action(
            &mut run,
            json!({
                "type": "call_llm",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "llm": {"uuid": llm.uuid, "name": "GPT"},
                "instructions": "Translate to French",
                "input": "Hello",
                "output_local": "translation"
            }),
        )
        .await;
        assert_eq!(error_texts(&events), vec!["no LLM service configured"]);
        assert_eq!(run.locals().get("_llm_status"), "failure");
        assert_eq!(run.locals().get("translation"), "");
    }

    #[tokio::test]
    async fn test_transfer_airtime() {
        let mock = Arc::new(MockAirtime::new());
        let service = Arc::clone(&mock);
        let engine = Engine::builder()
            .airtime_service(move || Ok(service.clone() as Arc<dyn AirtimeService>))
            .build()
            .unwrap();
        let mut run = TestSession::builder().engine(engine).build_run();

        let events = run_action(
            &mut run,
            json!({
                "type": "transfer_airtime",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "amounts": {"RWF": 500, "USD": 0.5},
                "result_name": "Reward Transfer"
            }),
        )
        .await;

        assert_eq!(types(&events), vec!["airtime_transferred", "run_result_changed"]);
        match &events[0].kind {
            EventKind::AirtimeTransferred(e) => {
                assert_eq!(e.recipient, Urn::from("tel:+250788123123"));
                assert_eq!(e.currency, "RWF");
                assert_eq!(e.amount, Number::from(500));
            }
            _ => panic!("expected airtime_transferred"),
        }
        let result = run.results().get("reward_transfer").unwrap();
        assert_eq!(result.category, "Success");
        assert_eq!(result.value, MockAirtime::EXTERNAL_ID);
    }

    #[tokio::test]
    async fn test_transfer_airtime_without_phone() {
        let mut run = TestSession::builder().build_run();
        run.contact_mut().unwrap().clear_urns();
        let events = run_action(
            &mut run,
            json!({
                "type": "transfer_airtime",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "amounts": {"RWF": 500},
                "result_name": "Reward Transfer"
            }),
        )
        .await;
        assert_eq!(
            error_texts(&events),
            vec!["can't transfer airtime to contact without a phone number"]
        );
        let result = run.results().get("reward_transfer").unwrap();
        assert_eq!(result.category, "Failure");
        assert_eq!(result.value, "");
    }

    #[tokio::test]
    async fn test_send_email() {
        let mock = Arc::new(MockEmail::new());
        let service = Arc::clone(&mock);
        let engine = Engine::builder()
            .email_service(move || Ok(service.clone() as Arc<dyn EmailService>))
            .build()
            .unwrap();
        let mut run = TestSession::builder().engine(engine).build_run();

        let events = run_action(
            &mut run,
            json!({
                "type": "send_email",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "addresses": ["mailto:bob@nyaruka.com", "@fields.missing"],
                "subject": "Hi\n there\t ",
                "body": "Welcome"
            }),
        )
        .await;

        assert_eq!(types(&events), vec!["error", "email_sent"]);
        match &events[1].kind {
            EventKind::EmailSent(e) => {
                assert_eq!(e.to, vec!["bob@nyaruka.com"]);
                assert_eq!(e.subject, "Hi there");
            }
            _ => panic!("expected email_sent"),
        }
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_email_empty_subject() {
        let mut run = TestSession::builder().build_run();
        let events = run_action(
            &mut run,
            json!({
                "type": "send_email",
                "uuid": "ad154980-7bf7-4ab8-8728-545fd6378912",
                "addresses": ["bob@nyaruka.com"],
                "subject": "  @fields.missing ",
                "body": "Welcome"
            }),
        )
        .await;
        assert_eq!(
            error_texts(&events),
            vec!["email subject evaluated to empty string, skipping"]
        );
    }
}
