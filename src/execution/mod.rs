// Order lifecycle, tick execution and session control
pub mod executor;
pub mod session;
pub mod tracker;

pub use executor::{GapTrader, TickAction, TickOutcome};
pub use session::{SessionController, SessionReport, SessionSettings};
pub use tracker::{LifecycleSnapshot, OrderLifecycleTracker};

use crate::api::GatewayError;
use crate::config::ConfigError;
use crate::persistence::PersistenceError;
use crate::strategy::InvariantViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl TradeError {
    /// Errors no later tick can recover from
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradeError::Config(_) | TradeError::Invariant(_))
    }
}
