//! Gap market-making state machine.
//!
//! The strategy alternates a buy below the mark price and a sell above it:
//!
//! ```text
//! AwaitingBuyEntry --place buy @ p - gap/2--> BuyPending
//! BuyPending       --p < buy, no open orders--> AwaitingSellExit
//! BuyPending       --p > buy + gap + ignore, cancel--> AwaitingBuyEntry
//! AwaitingSellExit --place sell @ p + gap--> SellPending
//! SellPending      --p > buy, no open orders--> AwaitingBuyEntry
//! SellPending      --p < buy - gap - ignore, cancel--> AwaitingSellExit
//! ```
//!
//! [`decide`] is pure: it never talks to the exchange. The one input it cannot
//! know (whether orders are still open) is returned as [`Decision::ConfirmFill`]
//! for the caller to resolve with a live query. Each tick yields at most one
//! transition.

use crate::config::StrategyConfig;
use crate::models::Side;
use std::fmt;
use thiserror::Error;

/// Internal consistency failure; never recovered
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Action state: place the entry buy
    AwaitingBuyEntry,
    /// Buy resting on the book
    BuyPending,
    /// Action state: place the exit sell
    AwaitingSellExit,
    /// Sell resting on the book
    SellPending,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::AwaitingBuyEntry,
        LifecycleState::BuyPending,
        LifecycleState::AwaitingSellExit,
        LifecycleState::SellPending,
    ];

    /// Wait states rely on a remembered buy price
    pub fn is_pending(&self) -> bool {
        matches!(self, LifecycleState::BuyPending | LifecycleState::SellPending)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::AwaitingBuyEntry => "AwaitingBuyEntry",
            LifecycleState::BuyPending => "BuyPending",
            LifecycleState::AwaitingSellExit => "AwaitingSellExit",
            LifecycleState::SellPending => "SellPending",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapParams {
    pub gap: f64,
    pub gap_ignore: f64,
}

impl GapParams {
    /// Distance past which a resting order is considered stale
    pub fn cancel_distance(&self) -> f64 {
        self.gap + self.gap_ignore
    }
}

impl From<&StrategyConfig> for GapParams {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            gap: config.gap(),
            gap_ignore: config.gap_ignore(),
        }
    }
}

/// What a tick should do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Place a limit order, remember its price, then move to `next`
    Place {
        side: Side,
        price: f64,
        next: LifecycleState,
    },
    /// Price says the resting order filled; move to `next` only if the
    /// exchange reports no open orders, otherwise hold
    ConfirmFill { next: LifecycleState },
    /// Market moved too far: cancel all orders and move to `next`
    Cancel { next: LifecycleState },
    Hold,
}

/// Decide the single action for this tick.
///
/// `buy_price` is the remembered reference price; both pending states compare
/// the mark price against it.
pub fn decide(
    params: &GapParams,
    state: LifecycleState,
    buy_price: Option<f64>,
    mark_price: f64,
) -> Result<Decision, InvariantViolation> {
    match state {
        LifecycleState::AwaitingBuyEntry => Ok(Decision::Place {
            side: Side::Buy,
            price: order_price(Side::Buy, mark_price - params.gap / 2.0)?,
            next: LifecycleState::BuyPending,
        }),

        LifecycleState::AwaitingSellExit => Ok(Decision::Place {
            side: Side::Sell,
            price: order_price(Side::Sell, mark_price + params.gap)?,
            next: LifecycleState::SellPending,
        }),

        LifecycleState::BuyPending => {
            let buy = reference_price(state, buy_price)?;

            if mark_price < buy {
                Ok(Decision::ConfirmFill {
                    next: LifecycleState::AwaitingSellExit,
                })
            } else if mark_price > buy + params.cancel_distance() {
                Ok(Decision::Cancel {
                    next: LifecycleState::AwaitingBuyEntry,
                })
            } else {
                Ok(Decision::Hold)
            }
        }

        LifecycleState::SellPending => {
            let buy = reference_price(state, buy_price)?;

            if mark_price > buy {
                Ok(Decision::ConfirmFill {
                    next: LifecycleState::AwaitingBuyEntry,
                })
            } else if mark_price < buy - params.cancel_distance() {
                Ok(Decision::Cancel {
                    next: LifecycleState::AwaitingSellExit,
                })
            } else {
                Ok(Decision::Hold)
            }
        }
    }
}

fn reference_price(state: LifecycleState, buy_price: Option<f64>) -> Result<f64, InvariantViolation> {
    buy_price.ok_or_else(|| InvariantViolation(format!("{} without a remembered buy price", state)))
}

fn order_price(side: Side, price: f64) -> Result<f64, InvariantViolation> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(InvariantViolation(format!(
            "computed {} price {} is not a positive number",
            side, price
        )))
    }
}
