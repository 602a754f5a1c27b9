//! `inbox` repository — durable inbound event log keyed by idempotency,
//! deduplicating external deliveries across retries.

use model::{InboxDraft, InboxEventStatus, InboxRecord};
use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::RepositoryError;

/// Inserts a pending inbox row, or is a no-op if `idempotency_key` already
/// exists (`ON CONFLICT DO NOTHING`) — duplicate deliveries are a no-op
/// success.
pub async fn create_if_absent<C: GenericClient>(
    client: &C,
    draft: &InboxDraft,
) -> Result<(), RepositoryError> {
    client
        .execute(
            r#"
            INSERT INTO inbox (event_type, payload, status, idempotency_key)
            VALUES ($1, $2, 'pending', $3)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
            &[
                &draft.event_type.as_str(),
                &draft.payload,
                &draft.idempotency_key,
            ],
        )
        .await?;
    Ok(())
}

/// Used for payment-callback and broker-response idempotency checks.
pub async fn get_by_idempotency<C: GenericClient>(
    client: &C,
    key: Uuid,
) -> Result<Option<InboxRecord>, RepositoryError> {
    let row = client
        .query_opt(
            r#"
            SELECT id, event_type, payload, status, idempotency_key, created_at, updated_at
            FROM inbox WHERE idempotency_key = $1
            "#,
            &[&key],
        )
        .await?;
    Ok(row.map(|r| row_to_inbox(&r)))
}

/// Leases up to `limit` pending rows under `FOR UPDATE SKIP LOCKED`.
pub async fn lease<C: GenericClient>(
    client: &C,
    limit: i64,
) -> Result<Vec<InboxRecord>, RepositoryError> {
    let rows = client
        .query(
            r#"
            SELECT id, event_type, payload, status, idempotency_key, created_at, updated_at
            FROM inbox
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
            &[&limit],
        )
        .await?;
    Ok(rows.iter().map(row_to_inbox).collect())
}

/// Transitions `pending -> processed`. One-way; never reverts.
pub async fn mark_processed<C: GenericClient>(client: &C, id: Uuid) -> Result<(), RepositoryError> {
    client
        .execute(
            "UPDATE inbox SET status = 'processed', updated_at = now() WHERE id = $1",
            &[&id],
        )
        .await?;
    Ok(())
}

fn row_to_inbox(row: &tokio_postgres::Row) -> InboxRecord {
    let event_type: String = row.get("event_type");
    let status: String = row.get("status");
    InboxRecord {
        id: row.get("id"),
        event_type: event_type.parse().expect("event_type check constraint guarantees a known value"),
        payload: row.get("payload"),
        status: parse_inbox_status(&status),
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_inbox_status(s: &str) -> InboxEventStatus {
    match s {
        "pending" => InboxEventStatus::Pending,
        "processed" => InboxEventStatus::Processed,
        other => panic!("inbox status check constraint guarantees a known value, got {other}"),
    }
}
