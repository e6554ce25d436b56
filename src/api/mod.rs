//! Exchange gateway: the capability contract the trading core calls through,
//! plus the Deribit REST implementation.
pub mod deribit;

pub use deribit::{DeribitClient, DeribitSettings, RetryPolicy};

use crate::models::{AccessToken, OrderPlacement, OrderRecord, Side};
use async_trait::async_trait;
use thiserror::Error;

/// Instrument traded when none is configured
pub const DEFAULT_INSTRUMENT: &str = "BTC-PERPETUAL";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure or non-success HTTP status
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The exchange answered with an error payload
    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::RequestFailed(e.to_string())
        }
    }
}

/// Operations the trading core needs from an exchange.
///
/// Every call is self-contained: implementations authenticate per call and
/// hold no session state the core relies on between calls.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AccessToken, GatewayError>;

    /// Current mark price of `instrument`
    async fn get_mark_price(&self, instrument: &str) -> Result<f64, GatewayError>;

    /// Place a resting limit order. `price` must be positive.
    async fn place_order(
        &self,
        side: Side,
        instrument: &str,
        price: f64,
    ) -> Result<OrderPlacement, GatewayError>;

    async fn cancel_all_orders(&self, instrument: &str) -> Result<(), GatewayError>;

    /// Live query; never answer from a cache
    async fn has_open_orders(&self, instrument: &str) -> Result<bool, GatewayError>;

    /// Recent orders (open, filled and cancelled) for the persistence sink
    async fn order_history(&self, instrument: &str) -> Result<Vec<OrderRecord>, GatewayError>;
}
