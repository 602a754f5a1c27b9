//! Outbound HTTP client with full-jitter retry/backoff, plus the three thin
//! adapters it carries: catalog, payments and notifications.
//!
//! The retry loop is hand-rolled rather than delegated to a generic retry
//! crate so the exact full-jitter formula (`uniform(0, min(max_delay,
//! base*2^attempt))`) stays testable and pinned.

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

pub mod catalog;
pub mod notifications;
pub mod payments;

pub use catalog::CatalogHttpAdapter;
pub use notifications::NotificationsHttpAdapter;
pub use payments::PaymentsHttpAdapter;

/// HTTP statuses retried by [`HttpClient::request`]. `400` is deliberately
/// excluded — a malformed request won't succeed on retry, so it is treated
/// as non-retryable.
const RETRYABLE_STATUS_CODES: [StatusCode; 4] = [
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("non-retryable status {0}")]
    NonRetryableStatus(StatusCode),
    #[error("all {0} attempts exhausted")]
    RetriesExhausted(u32),
}

/// Settings controlling the retry/backoff envelope, mirroring
/// `app_config::AppConfig`'s `http_*` fields.
#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub max_retry: u32,
    pub timeout_read: Duration,
    pub max_delay: Duration,
}

/// `BaseHTTPXClient` equivalent: a `reqwest::Client` plus the retry envelope.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    settings: HttpClientSettings,
    base_delay: Duration,
}

impl HttpClient {
    pub fn new(settings: HttpClientSettings) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(settings.timeout_read)
            .build()?;
        Ok(Self {
            client,
            settings,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Samples a full-jitter delay for `attempt` (0-indexed): `uniform(0,
    /// min(max_delay, base*2^attempt))`.
    fn jitter_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exponential.min(self.settings.max_delay);
        let capped_secs = capped.as_secs_f64();
        if capped_secs <= 0.0 {
            return Duration::ZERO;
        }
        let sampled = rand::thread_rng().gen_range(0.0..=capped_secs);
        Duration::from_secs_f64(sampled)
    }

    /// Issues `method url` with up to `max_retry + 1` total attempts,
    /// retrying on [`RETRYABLE_STATUS_CODES`] and on connect/timeout
    /// transport errors. Non-retryable errors propagate immediately.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        json: Option<&B>,
    ) -> Result<reqwest::Response, HttpClientError> {
        let total_attempts = self.settings.max_retry + 1;
        info!(%method, url, "HTTP request initiated");

        for attempt in 0..total_attempts {
            let mut builder = self.client.request(method.clone(), url);
            for (key, value) in headers {
                builder = builder.header(*key, *value);
            }
            if let Some(body) = json {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if RETRYABLE_STATUS_CODES.contains(&status) && attempt + 1 < total_attempts {
                        warn!(%method, url, %status, "retryable status code, retrying");
                        tokio::time::sleep(self.jitter_delay(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    if attempt + 1 < total_attempts {
                        warn!(%method, url, error = %err, "retryable transport error, retrying");
                        tokio::time::sleep(self.jitter_delay(attempt)).await;
                        continue;
                    }
                    error!(%method, url, "retries exhausted after transport error");
                    return Err(HttpClientError::Request(err));
                }
                Err(err) => return Err(HttpClientError::Request(err)),
            }
        }

        Err(HttpClientError::RetriesExhausted(total_attempts))
    }

    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<reqwest::Response, HttpClientError> {
        self.request::<()>(Method::GET, url, headers, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        json: &B,
    ) -> Result<reqwest::Response, HttpClientError> {
        self.request(Method::POST, url, headers, Some(json)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(HttpClientSettings {
            max_retry: 5,
            timeout_read: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
        })
        .unwrap()
    }

    #[test]
    fn jitter_delay_stays_within_the_full_jitter_envelope() {
        let c = client();
        for attempt in 0..6 {
            let cap = Duration::from_secs(1).saturating_mul(1 << attempt).min(c.settings.max_delay);
            for _ in 0..50 {
                let d = c.jitter_delay(attempt);
                assert!(d <= cap, "delay {d:?} exceeded cap {cap:?} at attempt {attempt}");
            }
        }
    }

    #[test]
    fn jitter_delay_is_capped_by_max_delay_even_at_high_attempts() {
        let c = client();
        let d = c.jitter_delay(20);
        assert!(d <= c.settings.max_delay);
    }
}
