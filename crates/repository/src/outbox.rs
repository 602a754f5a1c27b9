//! `outbox` repository — durable outbound event envelopes, leased under
//! `SELECT ... FOR UPDATE SKIP LOCKED` so N dispatcher replicas never lease
//! the same row.

use model::{EventType, OutboxDraft, OutboxEventStatus, OutboxRecord};
use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::RepositoryError;

/// Inserts a pending outbox row. Callers insert these in the same
/// transaction as the state change that motivates them.
pub async fn create<C: GenericClient>(
    client: &C,
    draft: &OutboxDraft,
) -> Result<OutboxRecord, RepositoryError> {
    let row = client
        .query_one(
            r#"
            INSERT INTO outbox (event_type, payload, status)
            VALUES ($1, $2, 'pending')
            RETURNING id, event_type, payload, status, created_at, updated_at
            "#,
            &[&draft.event_type.as_str(), &draft.payload],
        )
        .await?;
    Ok(row_to_outbox(&row))
}

/// Leases up to `limit` pending rows whose `event_type` is one of
/// `event_types`, under `FOR UPDATE SKIP LOCKED`. An empty `event_types`
/// slice leases across all event types.
pub async fn lease<C: GenericClient>(
    client: &C,
    event_types: &[EventType],
    limit: i64,
) -> Result<Vec<OutboxRecord>, RepositoryError> {
    let type_strs: Vec<&str> = event_types.iter().map(EventType::as_str).collect();
    let rows = if type_strs.is_empty() {
        client
            .query(
                r#"
                SELECT id, event_type, payload, status, created_at, updated_at
                FROM outbox
                WHERE status = 'pending'
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
                "#,
                &[&limit],
            )
            .await?
    } else {
        client
            .query(
                r#"
                SELECT id, event_type, payload, status, created_at, updated_at
                FROM outbox
                WHERE status = 'pending' AND event_type = ANY($1)
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
                "#,
                &[&type_strs, &limit],
            )
            .await?
    };
    Ok(rows.iter().map(row_to_outbox).collect())
}

/// Transitions `pending -> sent`. One-way; never reverts.
pub async fn mark_sent<C: GenericClient>(client: &C, id: Uuid) -> Result<(), RepositoryError> {
    client
        .execute(
            "UPDATE outbox SET status = 'sent', updated_at = now() WHERE id = $1",
            &[&id],
        )
        .await?;
    Ok(())
}

fn row_to_outbox(row: &tokio_postgres::Row) -> OutboxRecord {
    let event_type: String = row.get("event_type");
    let status: String = row.get("status");
    OutboxRecord {
        id: row.get("id"),
        event_type: event_type.parse().expect("event_type check constraint guarantees a known value"),
        payload: row.get("payload"),
        status: parse_outbox_status(&status),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_outbox_status(s: &str) -> OutboxEventStatus {
    match s {
        "pending" => OutboxEventStatus::Pending,
        "sent" => OutboxEventStatus::Sent,
        other => panic!("outbox status check constraint guarantees a known value, got {other}"),
    }
}
