//! Payments adapter — `POST {payments_base}` with `X-API-Key`; success is
//! `201`.

use reqwest::StatusCode;
use serde::Serialize;

use crate::{HttpClient, HttpClientError};

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    order_id: &'a str,
    amount: &'a str,
    callback_url: &'a str,
    idempotency_key: &'a str,
}

pub struct PaymentsHttpAdapter {
    client: HttpClient,
    base_url: String,
    access_token: String,
    callback_url: String,
}

impl PaymentsHttpAdapter {
    pub fn new(client: HttpClient, base_url: String, access_token: String, callback_url: String) -> Self {
        Self {
            client,
            base_url,
            access_token,
            callback_url,
        }
    }

    /// Posts the `payment.requested` outbox payload to the Payments API.
    /// Returns `true` on `201`, `false` on any other (non-retried-away)
    /// response — the caller leaves the outbox row pending either way
    /// until this returns `true`.
    pub async fn create_payment(
        &self,
        order_id: &str,
        amount: &str,
        idempotency_key: &str,
    ) -> Result<bool, HttpClientError> {
        let body = CreatePaymentRequest {
            order_id,
            amount,
            callback_url: &self.callback_url,
            idempotency_key,
        };
        let response = self
            .client
            .post(&self.base_url, &[("X-API-Key", self.access_token.as_str())], &body)
            .await?;
        Ok(response.status() == StatusCode::CREATED)
    }
}
