//! Business logic layer: the create-order transaction, the payment-callback
//! handler, and the broker shipping-response handler. Each opens its own
//! [`UnitOfWork`] and either commits every write it produces or none of them.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use model::{
    payload, CatalogItem, EventType, InboxDraft, Order, OrderDraft, OrderStatusValue,
    OutboxDraft, PaymentCallback, PaymentStatus, ShippingResultMessage,
};
use repository::{inbox, order_status, orders, outbox, RepositoryError, UnitOfWork};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Errors surfaced by the use cases in this crate.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("item not found: {item_id}")]
    ItemNotFound { item_id: Uuid },
    #[error("not enough stock for item {item_id}")]
    NotEnoughStocks { item_id: Uuid },
    /// Carries the prior order so the HTTP boundary can surface it as a
    /// 200 "already accepted" response rather than an error.
    #[error("order already exists for this idempotency key")]
    OrderAlreadyExists { order: Box<Order> },
    #[error("catalog lookup failed: {0}")]
    Catalog(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Thin adapter over the catalog service's `GET {catalog_base}/{item_id}`.
/// Implemented by the `http-client` crate; kept as a trait here so
/// [`OrderService`] stays testable without a live HTTP dependency.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_item_stock(&self, item_id: Uuid) -> Result<Option<CatalogItem>, ServiceError>;
}

/// Input to [`OrderService::create_order`] — the parsed `POST /api/v1/orders`
/// body.
#[derive(Debug, Clone)]
pub struct OrderCreateInput {
    pub user_id: String,
    pub item_id: Uuid,
    pub quantity: i32,
    pub idempotency_key: Uuid,
}

/// The create-order transaction.
pub struct OrderService<C: CatalogService> {
    pool: Pool,
    catalog: Arc<C>,
}

impl<C: CatalogService> OrderService<C> {
    pub fn new(pool: Pool, catalog: Arc<C>) -> Self {
        Self { pool, catalog }
    }

    /// Validates, persists the order, and enqueues `payment.requested` +
    /// `order.created` in the same commit as the order insert.
    ///
    /// A duplicate `idempotency_key` returns
    /// [`ServiceError::OrderAlreadyExists`] with no writes; the HTTP layer
    /// maps that to 200 with the prior order's data, not an error.
    #[instrument(skip(self, input), fields(item_id = %input.item_id))]
    pub async fn create_order(&self, input: OrderCreateInput) -> Result<Order, ServiceError> {
        let mut conn = self.pool.get().await?;
        let uow = UnitOfWork::begin(&mut conn).await?;

        if let Some(existing) = orders::get_by_idempotency(uow.client(), input.idempotency_key).await? {
            return Err(ServiceError::OrderAlreadyExists {
                order: Box::new(existing),
            });
        }

        let item = self
            .catalog
            .get_item_stock(input.item_id)
            .await?
            .ok_or(ServiceError::ItemNotFound {
                item_id: input.item_id,
            })?;

        if item.available_qty < input.quantity {
            return Err(ServiceError::NotEnoughStocks {
                item_id: input.item_id,
            });
        }

        let amount = item.price * rust_decimal::Decimal::from(input.quantity);

        let draft = OrderDraft {
            user_id: input.user_id,
            item_id: input.item_id,
            quantity: input.quantity,
            amount,
            idempotency_key: input.idempotency_key,
        };
        let created = orders::create(uow.client(), &draft).await?;

        order_status::append(uow.client(), created.id, OrderStatusValue::New).await?;

        let payment_payload = payload::PaymentRequestPayload {
            order_id: created.id,
            amount: created.amount.to_string(),
            idempotency_key: created.idempotency_key,
        };
        outbox::create(
            uow.client(),
            &OutboxDraft {
                event_type: EventType::PaymentRequested,
                payload: serde_json::to_value(&payment_payload)
                    .expect("PaymentRequestPayload always serializes"),
            },
        )
        .await?;

        let notification_payload = payload::NotificationPayload {
            message: "Order created".to_string(),
            idempotency_key: Uuid::new_v4(),
        };
        outbox::create(
            uow.client(),
            &OutboxDraft {
                event_type: EventType::OrderCreated,
                payload: serde_json::to_value(&notification_payload)
                    .expect("NotificationPayload always serializes"),
            },
        )
        .await?;

        uow.commit().await?;
        Ok(created)
    }
}

/// The payment-callback handler.
pub struct PaymentCallbackHandler {
    pool: Pool,
}

impl PaymentCallbackHandler {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Idempotent inbox insert + cascaded outbox enqueue. Returns `Ok(())`
    /// for duplicates and `pending` payments alike — both are a no-op
    /// success at this boundary.
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    pub async fn handle(&self, payment: PaymentCallback) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await?;
        let uow = UnitOfWork::begin(&mut conn).await?;

        if inbox::get_by_idempotency(uow.client(), payment.idempotency_key)
            .await?
            .is_some()
        {
            return Ok(());
        }

        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Succeeded => {
                let payment_json =
                    serde_json::to_value(&payment).expect("PaymentCallback always serializes");
                inbox::create_if_absent(
                    uow.client(),
                    &InboxDraft {
                        event_type: EventType::OrderPaid,
                        payload: payment_json,
                        idempotency_key: payment.idempotency_key,
                    },
                )
                .await?;

                let notification = payload::NotificationPayload {
                    message: "Order is paid".to_string(),
                    idempotency_key: Uuid::new_v4(),
                };
                outbox::create(
                    uow.client(),
                    &OutboxDraft {
                        event_type: EventType::OrderPaid,
                        payload: serde_json::to_value(&notification)
                            .expect("NotificationPayload always serializes"),
                    },
                )
                .await?;

                let order = orders::get_by_id(uow.client(), payment.order_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                let shipping_request = payload::ShippingRequestPayload {
                    event_type: EventType::OrderPaid.as_str().to_string(),
                    order_id: order.id,
                    item_id: order.item_id,
                    quantity: order.quantity.to_string(),
                    idempotency_key: Uuid::new_v4(),
                };
                outbox::create(
                    uow.client(),
                    &OutboxDraft {
                        event_type: EventType::ShippingRequested,
                        payload: serde_json::to_value(&shipping_request)
                            .expect("ShippingRequestPayload always serializes"),
                    },
                )
                .await?;
            }
            PaymentStatus::Failed => {
                let payment_json =
                    serde_json::to_value(&payment).expect("PaymentCallback always serializes");
                inbox::create_if_absent(
                    uow.client(),
                    &InboxDraft {
                        event_type: EventType::OrderCancelled,
                        payload: payment_json,
                        idempotency_key: payment.idempotency_key,
                    },
                )
                .await?;

                let notification = payload::NotificationPayload {
                    message: "Order is cancelled".to_string(),
                    idempotency_key: Uuid::new_v4(),
                };
                outbox::create(
                    uow.client(),
                    &OutboxDraft {
                        event_type: EventType::OrderCancelled,
                        payload: serde_json::to_value(&notification)
                            .expect("NotificationPayload always serializes"),
                    },
                )
                .await?;
            }
        }

        uow.commit().await?;
        Ok(())
    }
}

/// Idempotent consumption of a broker shipping-result message into inbox +
/// outbox. The broker-consumer crate resolves the message, calls
/// [`handle`](Self::handle), and only commits the Kafka offset after this
/// returns `Ok`.
pub struct ShippingResultHandler {
    pool: Pool,
}

impl ShippingResultHandler {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Resolves the dedup key (`shipment_id` preferred, falling back to
    /// `order_id`), returning `None` when the message carries neither — the
    /// caller should drop (log) such a message without
    /// touching the database.
    pub fn idempotency_key(message: &ShippingResultMessage) -> Option<Uuid> {
        if let Some(shipment_id) = &message.shipment_id {
            Some(Uuid::new_v5(
                &Uuid::NAMESPACE_DNS,
                format!("shipping-{shipment_id}").as_bytes(),
            ))
        } else {
            message.order_id.map(|order_id| {
                Uuid::new_v5(
                    &Uuid::NAMESPACE_DNS,
                    format!("shipping-{order_id}").as_bytes(),
                )
            })
        }
    }

    #[instrument(skip(self, message))]
    pub async fn handle(&self, message: ShippingResultMessage) -> Result<(), ServiceError> {
        let Some(key) = Self::idempotency_key(&message) else {
            tracing::warn!("shipping result message carries neither shipment_id nor order_id, dropping");
            return Ok(());
        };

        let mut conn = self.pool.get().await?;
        let uow = UnitOfWork::begin(&mut conn).await?;

        if inbox::get_by_idempotency(uow.client(), key).await?.is_some() {
            return Ok(());
        }

        let cancelled = message.event_type.to_lowercase().contains("cancel");
        let (event_type, verb) = if cancelled {
            (EventType::OrderCancelled, "cancelled")
        } else {
            (EventType::OrderShipped, "shipped")
        };

        let message_json = serde_json::to_value(&message).expect("ShippingResultMessage always serializes");
        inbox::create_if_absent(
            uow.client(),
            &InboxDraft {
                event_type,
                payload: message_json,
                idempotency_key: key,
            },
        )
        .await?;

        let order_id = message
            .order_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let notification = payload::NotificationPayload {
            message: format!("Order {order_id} has been {verb}"),
            idempotency_key: Uuid::new_v4(),
        };
        outbox::create(
            uow.client(),
            &OutboxDraft {
                event_type,
                payload: serde_json::to_value(&notification)
                    .expect("NotificationPayload always serializes"),
            },
        )
        .await?;

        uow.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_prefers_shipment_id_over_order_id() {
        let order_id = Uuid::new_v4();
        let with_shipment = ShippingResultMessage {
            event_type: "order.shipped".into(),
            order_id: Some(order_id),
            item_id: None,
            quantity: None,
            shipment_id: Some("ship-1".into()),
        };
        let without_shipment = ShippingResultMessage {
            shipment_id: None,
            ..with_shipment.clone()
        };

        let k1 = ShippingResultHandler::idempotency_key(&with_shipment).unwrap();
        let k2 = ShippingResultHandler::idempotency_key(&without_shipment).unwrap();
        assert_ne!(k1, k2, "shipment_id-derived key must differ from order_id-derived key");

        let k1_again = ShippingResultHandler::idempotency_key(&with_shipment).unwrap();
        assert_eq!(k1, k1_again, "the same shipment_id must always derive the same key");
    }

    #[test]
    fn idempotency_key_is_none_without_any_identifier() {
        let message = ShippingResultMessage {
            event_type: "order.shipped".into(),
            order_id: None,
            item_id: None,
            quantity: None,
            shipment_id: None,
        };
        assert!(ShippingResultHandler::idempotency_key(&message).is_none());
    }
}
