//! Notifications adapter — `POST {notifications_base}` with `X-API-Key`;
//! success is `201`.

use reqwest::StatusCode;
use serde::Serialize;

use crate::{HttpClient, HttpClientError};

#[derive(Debug, Serialize)]
struct SendNotificationRequest<'a> {
    message: &'a str,
    idempotency_key: &'a str,
}

pub struct NotificationsHttpAdapter {
    client: HttpClient,
    base_url: String,
    access_token: String,
}

impl NotificationsHttpAdapter {
    pub fn new(client: HttpClient, base_url: String, access_token: String) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    pub async fn send_notification(&self, message: &str, idempotency_key: &str) -> Result<bool, HttpClientError> {
        let body = SendNotificationRequest {
            message,
            idempotency_key,
        };
        let response = self
            .client
            .post(&self.base_url, &[("X-API-Key", self.access_token.as_str())], &body)
            .await?;
        Ok(response.status() == StatusCode::CREATED)
    }
}
