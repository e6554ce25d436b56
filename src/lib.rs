// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use api::{ExchangeGateway, GatewayError};
pub use config::{ConfigError, StrategyConfig};
pub use execution::{GapTrader, SessionController, SessionReport, SessionSettings, TradeError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TradeError>;
