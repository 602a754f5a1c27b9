//! The inbound HTTP boundary: `POST /api/v1/orders`,
//! `POST /api/v1/orders/payment-callback`, plus `/health` and `/metrics`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use model::{Order, PaymentCallback};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde::{Deserialize, Serialize};
use service::{CatalogService, OrderCreateInput, OrderService, PaymentCallbackHandler, ServiceError};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Server wires the create-order and payment-callback use cases behind the
/// HTTP boundary and blocks until shut down.
pub struct Server<C: CatalogService + 'static> {
    order_service: Arc<OrderService<C>>,
    payment_callback: Arc<PaymentCallbackHandler>,
    port: u16,
    metrics: Arc<Metrics>,
}

/// `Metrics` collects and exposes HTTP server metrics via a
/// `prometheus::Registry`.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds"),
            &["method", "endpoint"],
        )
        .expect("failed to create http_request_duration_seconds metric");

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .expect("failed to create errors_total metric");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("failed to register http_requests_total metric");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("failed to register http_request_duration_seconds metric");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("failed to register errors_total metric");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total.with_label_values(&[source, endpoint]).inc();
    }
}

/// Body of `POST /api/v1/orders`.
#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    user_id: String,
    item_id: Uuid,
    quantity: i32,
    idempotency_key: Uuid,
}

#[derive(Debug, Serialize)]
struct OrderResponse {
    id: Uuid,
    user_id: String,
    item_id: Uuid,
    quantity: i32,
    amount: String,
    idempotency_key: Uuid,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id.clone(),
            item_id: order.item_id,
            quantity: order.quantity,
            amount: order.amount.to_string(),
            idempotency_key: order.idempotency_key,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

impl<C: CatalogService + 'static> Server<C> {
    pub fn new(
        port: u16,
        order_service: Arc<OrderService<C>>,
        payment_callback: Arc<PaymentCallbackHandler>,
    ) -> Self {
        info!(port, "initializing HTTP server");
        Self {
            order_service,
            payment_callback,
            port,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.create_router();

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("failed to bind to port")?;

        info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    fn create_router(&self) -> Router {
        let metrics = self.metrics.clone();

        Router::new()
            .route("/api/v1/orders", post(Self::handle_create_order))
            .route("/api/v1/orders/payment-callback", post(Self::handle_payment_callback))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .layer(axum::middleware::from_fn_with_state(metrics.clone(), Self::metrics_middleware))
            .with_state(AppState {
                order_service: self.order_service.clone(),
                payment_callback: self.payment_callback.clone(),
                metrics,
            })
    }

    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let start = std::time::Instant::now();

        let response = next.run(req).await;

        let duration = start.elapsed();
        let status = response.status().as_u16();
        metrics.record_request(&method, &path, status, duration);
        if status >= 400 {
            metrics.record_error("http", &path);
        }

        response
    }

    /// Maps [`service::OrderService::create_order`] onto response status
    /// codes: `201` new order, `200` idempotent repeat (carrying the prior
    /// order), `404` item not found, `400` not enough stock, `422`
    /// malformed request, `500` transient/catalog/db failure.
    async fn handle_create_order(
        State(state): State<AppState<C>>,
        Json(body): Json<CreateOrderRequest>,
    ) -> Response {
        if body.quantity <= 0 {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive");
        }

        let input = OrderCreateInput {
            user_id: body.user_id,
            item_id: body.item_id,
            quantity: body.quantity,
            idempotency_key: body.idempotency_key,
        };

        match state.order_service.create_order(input).await {
            Ok(order) => (StatusCode::CREATED, Json(OrderResponse::from(&order))).into_response(),
            Err(ServiceError::OrderAlreadyExists { order }) => {
                (StatusCode::OK, Json(OrderResponse::from(order.as_ref()))).into_response()
            }
            Err(ServiceError::ItemNotFound { item_id }) => {
                warn!(%item_id, "create order: item not found");
                error_response(StatusCode::NOT_FOUND, format!("item not found: {item_id}"))
            }
            Err(ServiceError::NotEnoughStocks { item_id }) => {
                warn!(%item_id, "create order: not enough stock");
                error_response(StatusCode::BAD_REQUEST, format!("not enough stock for item {item_id}"))
            }
            Err(e) => {
                error!(error = %e, "create order failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create order")
            }
        }
    }

    /// Always returns `200` once the callback is durably accepted — the
    /// external caller never sees a 4xx/5xx for a payload it already sent
    /// once. The handler itself is idempotent at `idempotency_key`.
    async fn handle_payment_callback(
        State(state): State<AppState<C>>,
        Json(body): Json<PaymentCallback>,
    ) -> Response {
        match state.payment_callback.handle(body).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => {
                error!(error = %e, "payment callback handling failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to process payment callback")
            }
        }
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState<C>>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!(error = %e, "failed to encode metrics");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics");
        }

        match String::from_utf8(buffer) {
            Ok(text) => (StatusCode::OK, text).into_response(),
            Err(e) => {
                error!(error = %e, "metrics buffer was not valid UTF-8");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid metrics data")
            }
        }
    }
}

#[derive(Clone)]
struct AppState<C: CatalogService + 'static> {
    order_service: Arc<OrderService<C>>,
    payment_callback: Arc<PaymentCallbackHandler>,
    metrics: Arc<Metrics>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_response_mirrors_order_fields() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            item_id: Uuid::new_v4(),
            quantity: 3,
            amount: rust_decimal::Decimal::new(1999, 2),
            idempotency_key: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let response = OrderResponse::from(&order);
        assert_eq!(response.id, order.id);
        assert_eq!(response.amount, "19.99");
    }
}
