//! `orders` repository — insert-once aggregate, looked up by id or by its
//! unique `idempotency_key`.

use model::{Order, OrderDraft};
use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::{map_insert_err, RepositoryError};

/// Inserts a new order. Fails with [`RepositoryError::Duplicate`] if
/// `idempotency_key` collides — should not happen after the caller's
/// up-front [`get_by_idempotency`] check.
pub async fn create<C: GenericClient>(
    client: &C,
    draft: &OrderDraft,
) -> Result<Order, RepositoryError> {
    let row = client
        .query_one(
            r#"
            INSERT INTO orders (user_id, item_id, quantity, amount, idempotency_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, item_id, quantity, amount, idempotency_key, created_at, updated_at
            "#,
            &[
                &draft.user_id,
                &draft.item_id,
                &draft.quantity,
                &draft.amount,
                &draft.idempotency_key,
            ],
        )
        .await
        .map_err(map_insert_err)?;
    Ok(row_to_order(&row))
}

/// Used for create-order idempotency: a repeat `idempotency_key` returns the
/// prior order instead of inserting a duplicate.
pub async fn get_by_idempotency<C: GenericClient>(
    client: &C,
    key: Uuid,
) -> Result<Option<Order>, RepositoryError> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, item_id, quantity, amount, idempotency_key, created_at, updated_at
            FROM orders WHERE idempotency_key = $1
            "#,
            &[&key],
        )
        .await?;
    Ok(row.map(|r| row_to_order(&r)))
}

pub async fn get_by_id<C: GenericClient>(
    client: &C,
    id: Uuid,
) -> Result<Option<Order>, RepositoryError> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, item_id, quantity, amount, idempotency_key, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
            &[&id],
        )
        .await?;
    Ok(row.map(|r| row_to_order(&r)))
}

fn row_to_order(row: &tokio_postgres::Row) -> Order {
    Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        item_id: row.get("item_id"),
        quantity: row.get("quantity"),
        amount: row.get("amount"),
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
