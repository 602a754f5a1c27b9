//! Core domain types shared across the order-processing substrate.
//!
//! These are the entities and envelopes behind the Inbox/Outbox pattern:
//! [`Order`] and [`OrderStatusRecord`] for the order aggregate and its
//! append-only status history, [`OutboxRecord`]/[`InboxRecord`] for the
//! durable event envelopes, plus the small set of DTOs exchanged with the
//! HTTP and broker boundaries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order — the central aggregate. Immutable after creation except timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub item_id: Uuid,
    pub quantity: i32,
    /// Fixed-point decimal, precision 19 scale 2.
    pub amount: Decimal,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new [`Order`]; `id`/timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: String,
    pub item_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    pub idempotency_key: Uuid,
}

/// The conventional order lifecycle: `new -> paid -> shipped`, or `new -> cancelled` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusValue {
    New,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatusValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusValue::New => "new",
            OrderStatusValue::Paid => "paid",
            OrderStatusValue::Shipped => "shipped",
            OrderStatusValue::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatusValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(OrderStatusValue::New),
            "paid" => Ok(OrderStatusValue::Paid),
            "shipped" => Ok(OrderStatusValue::Shipped),
            "cancelled" => Ok(OrderStatusValue::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Append-only audit row. The *current* status is the row with the greatest
/// `created_at` for an `order_id` — a query, never a cached pointer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatusValue,
    pub created_at: DateTime<Utc>,
}

/// The set of event types flowing through outbox/inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum EventType {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.paid")]
    OrderPaid,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "order.shipped")]
    OrderShipped,
    #[serde(rename = "payment.requested")]
    PaymentRequested,
    #[serde(rename = "shipping.requested")]
    ShippingRequested,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order.created",
            EventType::OrderPaid => "order.paid",
            EventType::OrderCancelled => "order.cancelled",
            EventType::OrderShipped => "order.shipped",
            EventType::PaymentRequested => "payment.requested",
            EventType::ShippingRequested => "shipping.requested",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order.created" => Ok(EventType::OrderCreated),
            "order.paid" => Ok(EventType::OrderPaid),
            "order.cancelled" => Ok(EventType::OrderCancelled),
            "order.shipped" => Ok(EventType::OrderShipped),
            "payment.requested" => Ok(EventType::PaymentRequested),
            "shipping.requested" => Ok(EventType::ShippingRequested),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxEventStatus {
    Pending,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxEventStatus {
    Pending,
    Processed,
}

/// Durable outbound event envelope. `payload` shape is discriminated by
/// `event_type` (see [`payload`]); at the store boundary it is opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub status: OutboxEventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OutboxDraft {
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

/// Durable inbound event envelope, keyed by the external event's dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxRecord {
    pub id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub status: InboxEventStatus,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InboxDraft {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub idempotency_key: Uuid,
}

/// Tagged-sum payload shapes stored (flattened) as outbox/inbox JSON payload.
pub mod payload {
    use super::*;

    /// User-facing notification envelope (`order.created`/`order.paid`/
    /// `order.cancelled`/`order.shipped`).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NotificationPayload {
        pub message: String,
        pub idempotency_key: Uuid,
    }

    /// `payment.requested` outbox payload, sent to the Payments API.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PaymentRequestPayload {
        pub order_id: Uuid,
        /// Decimal amount encoded as a string, matching the payments wire contract.
        pub amount: String,
        pub idempotency_key: Uuid,
    }

    /// `shipping.requested` outbox payload, published to the broker topic.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ShippingRequestPayload {
        pub event_type: String,
        pub order_id: Uuid,
        pub item_id: Uuid,
        pub quantity: String,
        pub idempotency_key: Uuid,
    }
}

/// Payment status reported by the external payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Body of `POST /api/v1/orders/payment-callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub id: Uuid,
    pub user_id: String,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Inbound broker message carrying a shipping result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingResultMessage {
    pub event_type: String,
    pub order_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub quantity: Option<i32>,
    pub shipment_id: Option<String>,
}

/// Catalog item as returned by `GET {catalog_base}/{item_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub available_qty: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_type_round_trips_through_json() {
        let json = serde_json::to_string(&EventType::ShippingRequested).unwrap();
        assert_eq!(json, "\"shipping.requested\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::ShippingRequested);
    }

    #[test]
    fn order_status_value_parses_from_store_string() {
        assert_eq!(OrderStatusValue::from_str("paid").unwrap(), OrderStatusValue::Paid);
        assert!(OrderStatusValue::from_str("bogus").is_err());
    }

    #[test]
    fn notification_payload_serializes_with_idempotency_key() {
        let p = payload::NotificationPayload {
            message: "Order created".into(),
            idempotency_key: Uuid::nil(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["message"], "Order created");
    }
}
