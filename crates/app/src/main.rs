//! Order-processing service entry point.
//!
//! A single binary, multiple subcommands — one per process in the layout
//! the service actually runs as: the HTTP ingress, one outbox dispatcher per
//! downstream collaborator, the inbox applier, and the broker-response
//! consumer. Each subcommand loads [`AppConfig`], opens its own DB pool, and
//! runs until `SIGINT`/`SIGTERM`.

use std::sync::Arc;

use anyhow::{Context, Result};
use app_config::AppConfig;
use clap::{Parser, Subcommand};
use deadpool_postgres::Pool;
use http_client::{CatalogHttpAdapter, HttpClient, HttpClientSettings, NotificationsHttpAdapter, PaymentsHttpAdapter};
use service::{OrderService, PaymentCallbackHandler, ShippingResultHandler};
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;
use workers::{InboxApplier, NotificationsDispatchAction, OutboxDispatcher, PaymentsDispatchAction, ShippingDispatchAction};

#[derive(Parser)]
#[command(name = "order-service", about = "Order-processing service (HTTP ingress, workers, broker consumer)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the HTTP ingress (`POST /api/v1/orders`, payment callback, health, metrics).
    Serve,
    /// Runs the outbox dispatcher for `payment.requested` rows.
    WorkerOutboxPayments,
    /// Runs the outbox dispatcher for notification-shaped rows.
    WorkerOutboxNotifications,
    /// Runs the outbox dispatcher for `shipping.requested` rows.
    WorkerOutboxShipping,
    /// Runs the inbox applier worker.
    WorkerInbox,
    /// Runs the broker shipping-result consumer.
    BrokerConsumer,
}

fn init_tracing(cfg: &AppConfig) {
    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if cfg.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn http_client(cfg: &AppConfig) -> Result<HttpClient> {
    HttpClient::new(HttpClientSettings {
        max_retry: cfg.http_max_retry,
        timeout_read: cfg.http_timeout_read,
        max_delay: cfg.http_max_delay,
    })
    .context("failed to build HTTP client")
}

async fn shutdown_notify() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let waiter = notify.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
        waiter.notify_waiters();
    });
    notify
}

async fn run_serve(cfg: AppConfig, pool: Pool) -> Result<()> {
    let http = http_client(&cfg)?;
    let catalog = Arc::new(CatalogHttpAdapter::new(
        http,
        cfg.catalog_service_api_url.clone(),
        cfg.capashino_service_access_token.clone(),
    ));
    let order_service = Arc::new(OrderService::new(pool.clone(), catalog));
    let payment_callback = Arc::new(PaymentCallbackHandler::new(pool));

    let server = server::Server::new(cfg.app_port, order_service, payment_callback);
    server.start().await
}

async fn run_worker_outbox_payments(cfg: AppConfig, pool: Pool) -> Result<()> {
    let http = http_client(&cfg)?;
    let adapter = PaymentsHttpAdapter::new(
        http,
        cfg.payments_service_api_url.clone(),
        cfg.capashino_service_access_token.clone(),
        cfg.payments_callback_url.clone(),
    );
    let dispatcher = OutboxDispatcher::new(pool, PaymentsDispatchAction::new(adapter), cfg.worker_poll_interval);
    dispatcher.run(shutdown_notify().await).await;
    Ok(())
}

async fn run_worker_outbox_notifications(cfg: AppConfig, pool: Pool) -> Result<()> {
    let http = http_client(&cfg)?;
    let adapter = NotificationsHttpAdapter::new(
        http,
        cfg.notifications_service_api_url.clone(),
        cfg.capashino_service_access_token.clone(),
    );
    let dispatcher = OutboxDispatcher::new(pool, NotificationsDispatchAction::new(adapter), cfg.worker_poll_interval);
    dispatcher.run(shutdown_notify().await).await;
    Ok(())
}

async fn run_worker_outbox_shipping(cfg: AppConfig, pool: Pool) -> Result<()> {
    let mut producer = broker_producer::ShippingProducer::new(&cfg);
    producer.start(&cfg).context("failed to start shipping producer")?;
    let dispatcher = OutboxDispatcher::new(pool, ShippingDispatchAction::new(producer), cfg.worker_poll_interval);
    dispatcher.run(shutdown_notify().await).await;
    Ok(())
}

async fn run_worker_inbox(cfg: AppConfig, pool: Pool) -> Result<()> {
    let applier = InboxApplier::new(pool, cfg.worker_poll_interval);
    applier.run(shutdown_notify().await).await;
    Ok(())
}

async fn run_broker_consumer(cfg: AppConfig, pool: Pool) -> Result<()> {
    let handler = Arc::new(ShippingResultHandler::new(pool));
    let consumer = broker_consumer::ShippingResultConsumer::new(&cfg.kafka_bootstrap, &cfg.kafka_topic, handler)
        .context("failed to start broker consumer")?;
    consumer.run(shutdown_notify().await).await.context("broker consumer failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&cfg);

    let pool = db::init_db_pool(&cfg).await.context("failed to initialize database pool")?;
    info!(command = ?std::env::args().nth(1), "order-service starting");

    match cli.command {
        Command::Serve => run_serve(cfg, pool).await,
        Command::WorkerOutboxPayments => run_worker_outbox_payments(cfg, pool).await,
        Command::WorkerOutboxNotifications => run_worker_outbox_notifications(cfg, pool).await,
        Command::WorkerOutboxShipping => run_worker_outbox_shipping(cfg, pool).await,
        Command::WorkerInbox => run_worker_inbox(cfg, pool).await,
        Command::BrokerConsumer => run_broker_consumer(cfg, pool).await,
    }
}
