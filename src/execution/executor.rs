use std::sync::Arc;

use crate::api::ExchangeGateway;
use crate::config::StrategyConfig;
use crate::execution::{OrderLifecycleTracker, TradeError};
use crate::models::OrderPlacement;
use crate::strategy::{decide, Decision, GapParams, LifecycleState};

#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    Placed(OrderPlacement),
    /// Price condition held and the exchange reported no open orders
    FillConfirmed,
    /// Price condition held but orders are still resting
    OrdersStillOpen,
    Cancelled,
    Held,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub mark_price: f64,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub action: TickAction,
}

impl TickOutcome {
    pub fn transitioned(&self) -> bool {
        self.from != self.to
    }

    /// A sell was confirmed filled: one buy -> sell -> buy round trip done
    pub fn completed_cycle(&self) -> bool {
        self.from == LifecycleState::SellPending
            && self.to == LifecycleState::AwaitingBuyEntry
            && self.action == TickAction::FillConfirmed
    }
}

/// Runs single ticks of the gap strategy against an exchange.
///
/// Owns the lifecycle tracker; `&mut self` on every mutating call keeps ticks
/// from overlapping.
pub struct GapTrader<G: ExchangeGateway + ?Sized> {
    config: StrategyConfig,
    gateway: Arc<G>,
    instrument: String,
    tracker: OrderLifecycleTracker,
}

impl<G: ExchangeGateway + ?Sized> GapTrader<G> {
    pub fn new(config: StrategyConfig, gateway: Arc<G>, instrument: impl Into<String>) -> Self {
        Self {
            config,
            gateway,
            instrument: instrument.into(),
            tracker: OrderLifecycleTracker::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn tracker(&self) -> &OrderLifecycleTracker {
        &self.tracker
    }

    /// Cancel stray orders and return to `AwaitingBuyEntry`
    pub async fn reset(&mut self) -> Result<(), TradeError> {
        self.config.validate()?;
        self.tracker
            .reset(&*self.gateway, &self.instrument)
            .await?;
        Ok(())
    }

    /// Fetch the mark price, decide, act, and commit at most one transition.
    ///
    /// On any error the tracker keeps its prior state.
    pub async fn tick(&mut self) -> Result<TickOutcome, TradeError> {
        self.config.validate()?;

        let mark_price = self.gateway.get_mark_price(&self.instrument).await?;
        let from = self.tracker.state();
        let params = GapParams::from(&self.config);

        let decision = decide(&params, from, self.tracker.buy_price(), mark_price)?;

        let action = match decision {
            Decision::Place { side, price, next } => {
                let placement = self
                    .gateway
                    .place_order(side, &self.instrument, price)
                    .await?;

                tracing::info!(
                    side = %side,
                    price = %price,
                    mark_price = %mark_price,
                    order_id = %placement.order_id,
                    "Placed order"
                );

                self.tracker.record_fill(side, price);
                self.tracker.advance(next);
                TickAction::Placed(placement)
            }

            Decision::ConfirmFill { next } => {
                if self.gateway.has_open_orders(&self.instrument).await? {
                    tracing::debug!(
                        "{}: price {} crossed the order but orders are still open",
                        from,
                        mark_price
                    );
                    TickAction::OrdersStillOpen
                } else {
                    self.tracker.advance(next);
                    TickAction::FillConfirmed
                }
            }

            Decision::Cancel { next } => {
                tracing::info!(
                    "{}: price {} moved past the tolerance band, cancelling",
                    from,
                    mark_price
                );
                self.gateway.cancel_all_orders(&self.instrument).await?;
                self.tracker.advance(next);
                TickAction::Cancelled
            }

            Decision::Hold => {
                tracing::debug!("{}: holding at price {}", from, mark_price);
                TickAction::Held
            }
        };

        Ok(TickOutcome {
            mark_price,
            from,
            to: self.tracker.state(),
            action,
        })
    }
}
