//! Airtime transfers through the DT One API.
//!
//! A transfer takes three calls: look up the recipient's operator, find a
//! fixed value product in one of the requested currencies, then create an
//! auto-confirmed transaction for it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use convoflow_engine::services::{AirtimeError, AirtimeService, AirtimeTransfer};
use convoflow_engine::types::{HttpLog, Urn};
use convoflow_engine::ServiceError;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use uuid::Uuid;

use crate::trace::{do_trace, Trace};

const DTONE_API_URL: &str = "https://dvs-api.dtone.com/v1";

/// Transaction status classes that count as a successful transfer.
const STATUS_CONFIRMED: i64 = 2;
const STATUS_SUBMITTED: i64 = 5;
const STATUS_COMPLETED: i64 = 7;

#[derive(Debug, Deserialize)]
struct Operator {
    id: i64,
    name: String,
    #[serde(default)]
    identified: bool,
}

#[derive(Debug, Deserialize)]
struct Product {
    id: i64,
    destination: ProductAmount,
}

#[derive(Debug, Deserialize)]
struct ProductAmount {
    amount: Number,
    unit: String,
}

#[derive(Debug, Serialize)]
struct TransactionRequest<'a> {
    external_id: String,
    product_id: i64,
    auto_confirm: bool,
    credit_party_identifier: CreditParty<'a>,
}

#[derive(Debug, Serialize)]
struct CreditParty<'a> {
    mobile_number: &'a str,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id: i64,
    status: TransactionStatus,
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    message: String,
    class: StatusClass,
}

#[derive(Debug, Deserialize)]
struct StatusClass {
    id: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// DT One airtime service. The API secret is masked in logs.
#[derive(Debug, Clone)]
pub struct DtOneAirtime {
    client: Client,
    base_url: String,
    key: String,
    secret: String,
}

impl DtOneAirtime {
    pub fn new(client: Client, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DTONE_API_URL.to_string(),
            key: key.into(),
            secret: secret.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<serde_json::Value>,
        logs: &mut Vec<HttpLog>,
    ) -> Result<T, ServiceError> {
        let mut builder = self
            .client
            .request(method, format!("{}/{endpoint}", self.base_url))
            .basic_auth(&self.key, Some(&self.secret));
        if let Some(payload) = payload {
            builder = builder.json(&payload);
        }
        let request = builder.build().map_err(|e| ServiceError::Request {
            message: format!("unable to create DT One request: {e}"),
        })?;

        let trace = do_trace(&self.client, request, usize::MAX).await;
        logs.push(trace.http_log(&[&self.secret]));
        if trace.error.is_none() && !trace.is_success() {
            return Err(api_error(&trace));
        }
        trace.check("DT One")?;
        trace.json("DT One")
    }
}

/// The messages of a DT One error response, or the status if it has none.
fn api_error(trace: &Trace) -> ServiceError {
    let response: ErrorResponse = serde_json::from_slice(&trace.body).unwrap_or_default();
    let message = if response.errors.is_empty() {
        format!("DT One request failed with status {}", trace.status.unwrap_or_default())
    } else {
        response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    ServiceError::Response { message }
}

fn failed(message: String, transfer: &AirtimeTransfer) -> AirtimeError {
    AirtimeError {
        error: ServiceError::Response { message },
        transfer: Some(transfer.clone()),
    }
}

fn same_amount(a: &Number, b: &Number) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-9,
        _ => false,
    }
}

#[async_trait]
impl AirtimeService for DtOneAirtime {
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Number>,
        logs: &mut Vec<HttpLog>,
    ) -> Result<AirtimeTransfer, AirtimeError> {
        let mut transfer = AirtimeTransfer {
            uuid: Uuid::new_v4(),
            external_id: String::new(),
            sender: sender.cloned(),
            recipient: recipient.clone(),
            currency: String::new(),
            desired_amount: Number::from(0),
            actual_amount: Number::from(0),
        };

        let mut phone = recipient.path().to_string();
        if !phone.starts_with('+') {
            phone.insert(0, '+');
        }

        let operators: Vec<Operator> = self
            .request(
                Method::POST,
                "lookup/mobile-number",
                Some(serde_json::json!({"mobile_number": phone})),
                logs,
            )
            .await
            .map_err(|e| failed(format!("number lookup failed: {e}"), &transfer))?;

        let Some(operator) = operators.into_iter().find(|o| o.identified) else {
            return Err(failed(
                format!("unable to find operator for number {phone}"),
                &transfer,
            ));
        };

        let products: Vec<Product> = self
            .request(
                Method::GET,
                &format!(
                    "products?type=FIXED_VALUE_RECHARGE&operator_id={}&per_page=100",
                    operator.id
                ),
                None,
                logs,
            )
            .await
            .map_err(|e| failed(format!("product fetch failed: {e}"), &transfer))?;

        let product = amounts.iter().find_map(|(currency, desired)| {
            products
                .iter()
                .find(|p| &p.destination.unit == currency && same_amount(&p.destination.amount, desired))
                .map(|p| (p, desired))
        });
        let Some((product, desired)) = product else {
            return Err(failed(
                format!("unable to find a suitable product for operator '{}'", operator.name),
                &transfer,
            ));
        };

        transfer.currency = product.destination.unit.clone();
        transfer.desired_amount = desired.clone();
        transfer.actual_amount = product.destination.amount.clone();

        let payload = TransactionRequest {
            external_id: transfer.uuid.to_string(),
            product_id: product.id,
            auto_confirm: true,
            credit_party_identifier: CreditParty {
                mobile_number: &phone,
            },
        };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| failed(format!("transaction creation failed: {e}"), &transfer))?;
        let transaction: Transaction = self
            .request(Method::POST, "async/transactions", Some(payload), logs)
            .await
            .map_err(|e| failed(format!("transaction creation failed: {e}"), &transfer))?;

        if ![STATUS_CONFIRMED, STATUS_SUBMITTED, STATUS_COMPLETED].contains(&transaction.status.class.id) {
            return Err(failed(
                format!(
                    "transaction to send product {} on operator {} ended with status {}",
                    product.id, operator.id, transaction.status.message
                ),
                &transfer,
            ));
        }

        transfer.external_id = transaction.id.to_string();
        tracing::debug!(
            transfer = %transfer.uuid,
            external_id = %transfer.external_id,
            currency = %transfer.currency,
            "airtime transferred"
        );
        Ok(transfer)
    }
}
