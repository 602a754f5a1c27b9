//! `order_status` repository — append-only audit log. The *current* status
//! is a query (greatest `created_at` for an `order_id`), never a cached
//! pointer.

use model::{OrderStatusRecord, OrderStatusValue};
use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::RepositoryError;

/// Inserts an audit row. Never updates or deletes existing rows.
pub async fn append<C: GenericClient>(
    client: &C,
    order_id: Uuid,
    status: OrderStatusValue,
) -> Result<OrderStatusRecord, RepositoryError> {
    let row = client
        .query_one(
            r#"
            INSERT INTO order_status (order_id, status)
            VALUES ($1, $2)
            RETURNING id, order_id, status, created_at
            "#,
            &[&order_id, &status.as_str()],
        )
        .await?;
    Ok(row_to_status(&row))
}

/// The row with the greatest `created_at` for `order_id` — the order's
/// current status.
pub async fn current<C: GenericClient>(
    client: &C,
    order_id: Uuid,
) -> Result<Option<OrderStatusRecord>, RepositoryError> {
    let row = client
        .query_opt(
            r#"
            SELECT id, order_id, status, created_at
            FROM order_status
            WHERE order_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            &[&order_id],
        )
        .await?;
    Ok(row.map(|r| row_to_status(&r)))
}

fn row_to_status(row: &tokio_postgres::Row) -> OrderStatusRecord {
    let status: String = row.get("status");
    OrderStatusRecord {
        id: row.get("id"),
        order_id: row.get("order_id"),
        status: status.parse().expect("status check constraint guarantees a known value"),
        created_at: row.get("created_at"),
    }
}
