// Relational storage
pub mod postgres;

pub use postgres::PostgresOrderLog;
