//! The outbox dispatcher workers and the inbox applier worker.
//!
//! Each is a long-running, single-threaded cooperative task: open a fresh
//! session, lease up to 100 pending rows under `FOR UPDATE SKIP LOCKED`,
//! commit immediately to release the row locks, then perform the side
//! effect for each leased row in its own one-row transaction before marking
//! it sent/processed. Releasing the lease transaction promptly — rather
//! than holding it for the whole batch's worth of HTTP/broker calls —
//! bounds lock duration to the `SELECT` itself; a crash between lease and
//! mark-sent leaves the row pending for the next poll (or another replica)
//! to re-lease, which is safe because every downstream effect is idempotent
//! at its own key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_producer::ShippingProducer;
use deadpool_postgres::Pool;
use http_client::{NotificationsHttpAdapter, PaymentsHttpAdapter};
use model::payload::{NotificationPayload, PaymentRequestPayload, ShippingRequestPayload};
use model::{EventType, InboxRecord, OrderStatusValue, OutboxRecord};
use repository::{inbox, order_status, outbox, RepositoryError, UnitOfWork};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// A dispatcher's side effect for one outbox row: return `true` on success
/// (HTTP 201 / broker ack), `false` to leave the row pending.
#[async_trait]
pub trait OutboxAction: Send + Sync {
    /// Event types this dispatcher leases — the payments/shipping
    /// dispatchers lease exactly one; the notifications dispatcher leases
    /// the union of all four notification-shaped event types.
    fn event_types(&self) -> &[EventType];

    async fn dispatch(&self, record: &OutboxRecord) -> bool;
}

/// Generic outbox dispatcher loop — one instance per worker kind
/// (payments/notifications/shipping).
pub struct OutboxDispatcher<A: OutboxAction> {
    pool: Pool,
    action: A,
    poll_interval: Duration,
    lease_limit: i64,
}

impl<A: OutboxAction> OutboxDispatcher<A> {
    pub fn new(pool: Pool, action: A, poll_interval: Duration) -> Self {
        Self {
            pool,
            action,
            poll_interval,
            lease_limit: 100,
        }
    }

    /// Runs until `shutdown` is notified; the poll sleep is the primary
    /// cancellation window.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "outbox dispatcher tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.notified() => {
                    info!("outbox dispatcher received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), RepositoryError> {
        let records = {
            let mut conn = self.pool.get().await?;
            let uow = UnitOfWork::begin(&mut conn).await?;
            let records = outbox::lease(uow.client(), self.action.event_types(), self.lease_limit).await?;
            uow.commit().await?;
            records
        };

        if records.is_empty() {
            return Ok(());
        }

        for record in &records {
            if self.action.dispatch(record).await {
                let mut conn = self.pool.get().await?;
                let uow = UnitOfWork::begin(&mut conn).await?;
                outbox::mark_sent(uow.client(), record.id).await?;
                uow.commit().await?;
            } else {
                warn!(outbox_id = %record.id, "outbox dispatch failed, leaving row pending");
            }
        }
        Ok(())
    }
}

/// Dispatches `payment.requested` outbox rows to the Payments API.
pub struct PaymentsDispatchAction {
    adapter: PaymentsHttpAdapter,
}

impl PaymentsDispatchAction {
    pub fn new(adapter: PaymentsHttpAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl OutboxAction for PaymentsDispatchAction {
    fn event_types(&self) -> &[EventType] {
        &[EventType::PaymentRequested]
    }

    async fn dispatch(&self, record: &OutboxRecord) -> bool {
        let payload: PaymentRequestPayload = match serde_json::from_value(record.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "malformed payment.requested payload");
                return false;
            }
        };
        let order_id = payload.order_id.to_string();
        let idempotency_key = payload.idempotency_key.to_string();
        match self
            .adapter
            .create_payment(&order_id, &payload.amount, &idempotency_key)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "payments adapter call failed");
                false
            }
        }
    }
}

/// Dispatches the union of notification-shaped outbox rows (`order.created`,
/// `order.paid`, `order.cancelled`, `order.shipped`) to the Notifications
/// API.
pub struct NotificationsDispatchAction {
    adapter: NotificationsHttpAdapter,
    event_types: [EventType; 4],
}

impl NotificationsDispatchAction {
    pub fn new(adapter: NotificationsHttpAdapter) -> Self {
        Self {
            adapter,
            event_types: [
                EventType::OrderCreated,
                EventType::OrderPaid,
                EventType::OrderCancelled,
                EventType::OrderShipped,
            ],
        }
    }
}

#[async_trait]
impl OutboxAction for NotificationsDispatchAction {
    fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    async fn dispatch(&self, record: &OutboxRecord) -> bool {
        let payload: NotificationPayload = match serde_json::from_value(record.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "malformed notification payload");
                return false;
            }
        };
        let idempotency_key = payload.idempotency_key.to_string();
        match self.adapter.send_notification(&payload.message, &idempotency_key).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "notifications adapter call failed");
                false
            }
        }
    }
}

/// Dispatches `shipping.requested` outbox rows to the broker topic.
pub struct ShippingDispatchAction {
    producer: ShippingProducer,
}

impl ShippingDispatchAction {
    pub fn new(producer: ShippingProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl OutboxAction for ShippingDispatchAction {
    fn event_types(&self) -> &[EventType] {
        &[EventType::ShippingRequested]
    }

    async fn dispatch(&self, record: &OutboxRecord) -> bool {
        let payload: ShippingRequestPayload = match serde_json::from_value(record.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "malformed shipping.requested payload");
                return false;
            }
        };
        match self.producer.publish_shipping_request(&payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(outbox_id = %record.id, error = %e, "broker publish failed");
                false
            }
        }
    }
}

/// Leases pending inbox rows and advances order state.
pub struct InboxApplier {
    pool: Pool,
    poll_interval: Duration,
    lease_limit: i64,
}

impl InboxApplier {
    pub fn new(pool: Pool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            lease_limit: 100,
        }
    }

    pub async fn run(&self, shutdown: Arc<Notify>) {
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "inbox applier tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.notified() => {
                    info!("inbox applier received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> Result<(), RepositoryError> {
        let records = {
            let mut conn = self.pool.get().await?;
            let uow = UnitOfWork::begin(&mut conn).await?;
            let records = inbox::lease(uow.client(), self.lease_limit).await?;
            uow.commit().await?;
            records
        };

        for record in &records {
            if let Some(status) = target_status(record) {
                let mut conn = self.pool.get().await?;
                let uow = UnitOfWork::begin(&mut conn).await?;
                let order_id = order_id_from_payload(record);
                if let Some(order_id) = order_id {
                    order_status::append(uow.client(), order_id, status).await?;
                } else {
                    warn!(inbox_id = %record.id, "inbox record payload has no order_id, marking processed without an order_status row");
                }
                inbox::mark_processed(uow.client(), record.id).await?;
                uow.commit().await?;
            } else {
                // event_type not one this applier advances state for; mark
                // processed so it doesn't block the lease forever.
                let mut conn = self.pool.get().await?;
                let uow = UnitOfWork::begin(&mut conn).await?;
                inbox::mark_processed(uow.client(), record.id).await?;
                uow.commit().await?;
            }
        }
        Ok(())
    }
}

fn target_status(record: &InboxRecord) -> Option<OrderStatusValue> {
    match record.event_type {
        EventType::OrderPaid => Some(OrderStatusValue::Paid),
        EventType::OrderCancelled => Some(OrderStatusValue::Cancelled),
        EventType::OrderShipped => Some(OrderStatusValue::Shipped),
        _ => None,
    }
}

fn order_id_from_payload(record: &InboxRecord) -> Option<uuid::Uuid> {
    record
        .payload
        .get("order_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn sample(event_type: EventType, payload: serde_json::Value) -> InboxRecord {
        InboxRecord {
            id: Uuid::new_v4(),
            event_type,
            payload,
            status: model::InboxEventStatus::Pending,
            idempotency_key: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn target_status_maps_terminal_events_to_order_status_values() {
        assert_eq!(
            target_status(&sample(EventType::OrderPaid, json!({}))),
            Some(OrderStatusValue::Paid)
        );
        assert_eq!(
            target_status(&sample(EventType::OrderShipped, json!({}))),
            Some(OrderStatusValue::Shipped)
        );
        assert_eq!(
            target_status(&sample(EventType::OrderCancelled, json!({}))),
            Some(OrderStatusValue::Cancelled)
        );
        assert_eq!(target_status(&sample(EventType::OrderCreated, json!({}))), None);
    }

    #[test]
    fn order_id_from_payload_extracts_a_valid_uuid() {
        let order_id = Uuid::new_v4();
        let record = sample(EventType::OrderPaid, json!({ "order_id": order_id.to_string() }));
        assert_eq!(order_id_from_payload(&record), Some(order_id));
    }

    #[test]
    fn order_id_from_payload_is_none_when_missing() {
        let record = sample(EventType::OrderPaid, json!({ "amount": "10.00" }));
        assert_eq!(order_id_from_payload(&record), None);
    }
}
