use crate::models::OrderRecord;
use crate::persistence::{OrderLog, PersistenceError};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Postgres-backed order log
pub struct PostgresOrderLog {
    pool: PgPool,
}

impl PostgresOrderLog {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres order log");

        Ok(Self { pool })
    }
}

#[async_trait]
impl OrderLog for PostgresOrderLog {
    async fn upsert_orders(&self, orders: &[OrderRecord]) -> Result<usize, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders (id, side, price, amount, status)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    updated_at = NOW()
                "#,
            )
            .bind(&order.id)
            .bind(order.side.as_str())
            .bind(order.price)
            .bind(order.amount)
            .bind(order.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!("Upserted {} orders into Postgres", orders.len());

        Ok(orders.len())
    }
}
