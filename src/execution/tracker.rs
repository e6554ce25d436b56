use crate::api::{ExchangeGateway, GatewayError};
use crate::models::Side;
use crate::strategy::LifecycleState;

/// Point-in-time copy of the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
}

/// Remembered reference prices and lifecycle state of the current cycle.
///
/// `buy_price` is set iff a buy was placed since the last reset, `sell_price`
/// likewise. Cancellation does not clear them; only [`reset`](Self::reset) does.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLifecycleTracker {
    state: LifecycleState,
    buy_price: Option<f64>,
    sell_price: Option<f64>,
}

impl Default for OrderLifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderLifecycleTracker {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::AwaitingBuyEntry,
            buy_price: None,
            sell_price: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn buy_price(&self) -> Option<f64> {
        self.buy_price
    }

    pub fn sell_price(&self) -> Option<f64> {
        self.sell_price
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.state,
            buy_price: self.buy_price,
            sell_price: self.sell_price,
        }
    }

    /// Remember the price of an order that was just placed
    pub(crate) fn record_fill(&mut self, side: Side, price: f64) {
        match side {
            Side::Buy => self.buy_price = Some(price),
            Side::Sell => self.sell_price = Some(price),
        }
    }

    pub(crate) fn advance(&mut self, next: LifecycleState) {
        if next != self.state {
            tracing::info!("Lifecycle {} -> {}", self.state, next);
        }
        self.state = next;
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    /// Cancel every open order on `instrument`, then forget the cycle.
    ///
    /// Idempotent. If the cancel fails the tracker is left untouched.
    pub async fn reset<G>(&mut self, gateway: &G, instrument: &str) -> Result<(), GatewayError>
    where
        G: ExchangeGateway + ?Sized,
    {
        gateway.cancel_all_orders(instrument).await?;
        self.clear();

        tracing::info!("Reset lifecycle for {} (orders cancelled)", instrument);

        Ok(())
    }
}
