//! Calling webhooks and resthook subscribers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::{
    evaluate_trimmed, save_webhook_result, validate_result_name, WEBHOOK_CATEGORIES,
};
use super::{Action, ActionBase, DependencyCallback, LocalCallback, ResultCallback};
use crate::errors::{ActionError, ReadError};
use crate::events::{Event, ResthookCalled};
use crate::run::{EventCallback, ModifierCallback, Run, Step};
use crate::services::WebhookRequest;
use crate::types::{AssetReference, CallStatus, ResultInfo, WebhookCall};

/// Whether a header name is an RFC 7230 token.
fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}

fn inspect_result(name: &str, result: &mut ResultCallback<'_>) {
    if !name.is_empty() {
        result(ResultInfo::new(name, WEBHOOK_CATEGORIES));
    }
}

// ---------------------------------------------------------------------------
// call_webhook
// ---------------------------------------------------------------------------

const METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE"];

/// Calls an external URL. The call is saved on the run as its webhook and,
/// with a result name, as a result.
///
/// ```json
/// {
///   "type": "call_webhook",
///   "uuid": "...",
///   "method": "GET",
///   "url": "http://localhost:49998/?cmd=success",
///   "headers": {"Authorization": "Token AAFFZZHH"},
///   "result_name": "webhook"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallWebhook {
    #[serde(flatten)]
    pub base: ActionBase,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_name: String,
}

#[async_trait]
impl Action for CallWebhook {
    impl_base!();

    fn validate(&self) -> Result<(), ReadError> {
        if !METHODS.contains(&self.method.as_str()) {
            return Err(ReadError::validation(format!(
                "'{}' is not a valid HTTP method",
                self.method
            )));
        }
        for name in self.headers.keys() {
            if !is_valid_header_name(name) {
                return Err(ReadError::validation(format!(
                    "header '{name}' is not a valid HTTP header"
                )));
            }
        }
        validate_result_name(&self.result_name)
    }

    async fn execute(
        &self,
        run: &mut dyn Run,
        step: &Step,
        _log_modifier: &mut ModifierCallback<'_>,
        log_event: &mut EventCallback<'_>,
    ) -> Result<(), ActionError> {
        let url = evaluate_trimmed(run, &self.url, log_event);
        if url.is_empty() {
            log_event(Event::error("webhook URL evaluated to empty string"));
            return Ok(());
        }
        if url::Url::parse(&url).is_err() {
            log_event(Event::error(format!(
                "webhook URL evaluated to an invalid URL: '{url}'"
            )));
            return Ok(());
        }

        let mut request = WebhookRequest::new(self.method.clone(), url);
        if !self.body.is_empty() {
            request.body = run.evaluate_template(&self.body, log_event).0;
        }
        for (name, value) in &self.headers {
            let (value, _) = run.evaluate_template(value, log_event);
            request.headers.insert(name.clone(), value);
        }

        let engine = run.session().engine().clone();
        let service = match engine.services().webhook(engine.options().webhook_timeout) {
            Ok(service) => service,
            Err(e) => {
                log_event(Event::error(e));
                return Ok(());
            }
        };

        let call = match service.call(request).await {
            Ok(call) => call,
            Err(e) => {
                log_event(Event::error(e));
                return Ok(());
            }
        };

        let status = CallStatus::from_response(call.response_status, false);
        log_event(Event::webhook_called(&call, status, ""));
        if !self.result_name.is_empty() {
            save_webhook_result(run, step, &self.result_name, &call, status, log_event);
        }
        run.set_webhook(Some(call));
        Ok(())
    }

    fn inspect(
        &self,
        _dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        inspect_result(&self.result_name, result);
    }
}

// ---------------------------------------------------------------------------
// call_resthook
// ---------------------------------------------------------------------------

/// Posts the default payload to every subscriber of a resthook. A resthook
/// that doesn't exist is treated as having no subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResthook {
    #[serde(flatten)]
    pub base: ActionBase,
    pub resthook: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_name: String,
}

/// What subscribers are sent: the contact, the run and its results, and
/// the input if there is one.
fn default_payload(run: &dyn Run) -> Value {
    let session = run.session();
    let contact = run.contact().map(|c| {
        json!({
            "uuid": c.uuid(),
            "name": c.name(),
            "urn": c.urns().first(),
        })
    });
    json!({
        "contact": contact,
        "flow": run.flow_reference(),
        "results": run.results(),
        "run": {"uuid": run.uuid(), "status": run.status()},
        "input": session.input(),
        "channel": session.input().and_then(|i| i.channel.clone()),
    })
}

/// The call to save as the result: the last failure if there was one,
/// otherwise the last success.
fn pick_result(calls: &[(WebhookCall, CallStatus)]) -> Option<&(WebhookCall, CallStatus)> {
    calls
        .iter()
        .rev()
        .find(|(_, status)| *status != CallStatus::Success)
        .or_else(|| calls.last())
}

#[async_trait]
impl Action for CallResthook {
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
        let subscribers = run
            .session()
            .assets()
            .resthook(&self.resthook)
            .map(|r| r.subscribers.clone())
            .unwrap_or_default();

        let payload = default_payload(run);
        log_event(Event::new(ResthookCalled {
            resthook: self.resthook.clone(),
            payload: payload.clone(),
        }));

        if subscribers.is_empty() {
            return Ok(());
        }

        let engine = run.session().engine().clone();
        let service = match engine.services().webhook(engine.options().webhook_timeout) {
            Ok(service) => service,
            Err(e) => {
                log_event(Event::error(e));
                return Ok(());
            }
        };
        let body = payload.to_string();

        let mut calls = Vec::with_capacity(subscribers.len());
        for url in subscribers {
            let mut request = WebhookRequest::new("POST", url);
            request
                .headers
                .insert("Content-Type".into(), "application/json".into());
            request.body = body.clone();

            match service.call(request).await {
                Ok(call) => {
                    let status = CallStatus::from_response(call.response_status, true);
                    log_event(Event::webhook_called(&call, status, &self.resthook));
                    calls.push((call, status));
                }
                Err(e) => log_event(Event::error(e)),
            }
        }

        if let Some((call, status)) = pick_result(&calls) {
            if !self.result_name.is_empty() {
                save_webhook_result(run, step, &self.result_name, call, *status, log_event);
            }
            run.set_webhook(Some(call.clone()));
        }
        Ok(())
    }

    fn inspect(
        &self,
        dependency: &mut DependencyCallback<'_>,
        _local: &mut LocalCallback<'_>,
        result: &mut ResultCallback<'_>,
    ) {
        dependency(AssetReference::Resthook(self.resthook.clone()));
        inspect_result(&self.result_name, result);
    }
}
