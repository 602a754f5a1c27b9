//! # Store & Unit-of-Work
//!
//! Transactional boundary over `orders`, `order_status`, `outbox`, `inbox`.
//! A [`UnitOfWork`] wraps a single `tokio_postgres` transaction; repository
//! functions in [`orders`], [`order_status`], [`outbox`] and [`inbox`] are
//! generic over `tokio_postgres::GenericClient` so the same SQL runs against
//! a bare `Client` (read-only paths) or a `Transaction` (everything inside a
//! unit-of-work).
//!
//! Contention is handled with row-level `SELECT ... FOR UPDATE SKIP LOCKED`
//! leases rather than serializable isolation — read committed is sufficient.

use deadpool_postgres::{Object, PoolError};
use thiserror::Error;
use tokio_postgres::Transaction;

pub mod inbox;
pub mod order_status;
pub mod orders;
pub mod outbox;

/// Errors surfaced by the store layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    /// `orders.idempotency_key` collided on insert — should not happen after
    /// the up-front `get_by_idempotency` check.
    #[error("duplicate idempotency key")]
    Duplicate,
    #[error("not found")]
    NotFound,
}

/// Scoped acquisition of a transactional session over the four repositories.
///
/// Entered via [`UnitOfWork::begin`], performs N repository operations, and
/// either [`commit`](UnitOfWork::commit)s or is dropped — a drop without
/// commit rolls back implicitly.
pub struct UnitOfWork<'a> {
    tx: Transaction<'a>,
}

impl<'a> UnitOfWork<'a> {
    /// Begins a transaction on a pooled connection borrowed for the
    /// unit-of-work's lifetime. No implicit thread-locals: the caller owns
    /// the `Object` and passes it in by reference.
    pub async fn begin(conn: &'a mut Object) -> Result<Self, RepositoryError> {
        let tx = conn.transaction().await?;
        Ok(Self { tx })
    }

    /// The underlying transactional client, passed to repository functions.
    pub fn client(&self) -> &Transaction<'a> {
        &self.tx
    }

    /// Commits all writes performed through this unit-of-work.
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Rolls back all writes performed through this unit-of-work. Also
    /// happens implicitly on drop without a call to `commit`/`rollback`.
    pub async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Maps a unique-violation (`23505`) to [`RepositoryError::Duplicate`];
/// any other error passes through unchanged.
fn map_insert_err(err: tokio_postgres::Error) -> RepositoryError {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION {
            return RepositoryError::Duplicate;
        }
    }
    RepositoryError::Db(err)
}
