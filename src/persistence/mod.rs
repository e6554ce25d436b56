//! Order history sink.
//!
//! The session hands the exchange's order history to an [`OrderLog`] at the
//! end of every run. Implementations must upsert by order id: inserting new
//! orders and updating the status of known ones, so logging the same history
//! twice is harmless.

use crate::models::OrderRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait OrderLog: Send + Sync {
    /// Insert-or-update-status each order; returns the number of rows written
    async fn upsert_orders(&self, orders: &[OrderRecord]) -> Result<usize, PersistenceError>;
}

#[async_trait]
impl<T: OrderLog + ?Sized> OrderLog for std::sync::Arc<T> {
    async fn upsert_orders(&self, orders: &[OrderRecord]) -> Result<usize, PersistenceError> {
        (**self).upsert_orders(orders).await
    }
}
