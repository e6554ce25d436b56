mod common;

use common::{test_config, Op, ScriptedGateway, INSTRUMENT};
use gapbot::api::ExchangeGateway;
use gapbot::config::{ConfigError, StrategyConfig};
use gapbot::execution::{GapTrader, TickAction, TradeError};
use gapbot::models::Side;
use gapbot::strategy::LifecycleState;
use std::sync::Arc;

fn trader(prices: &[f64]) -> (GapTrader<ScriptedGateway>, Arc<ScriptedGateway>) {
    let gateway = Arc::new(ScriptedGateway::new(prices.iter().copied()));
    let trader = GapTrader::new(test_config(), gateway.clone(), INSTRUMENT);
    (trader, gateway)
}

#[tokio::test]
async fn test_scenario_walkthrough() {
    let _ = tracing_subscriber::fmt::try_init();

    let (mut trader, gateway) = trader(&[1000.0, 1000.0, 940.0, 940.0, 1150.0, 1150.0, 1060.0]);
    trader.reset().await.unwrap();

    // 1000: place buy at 1000 - 100/2
    let outcome = trader.tick().await.unwrap();
    assert!(matches!(outcome.action, TickAction::Placed(ref p) if p.side == Side::Buy));
    assert_eq!(outcome.to, LifecycleState::BuyPending);
    assert_eq!(trader.tracker().buy_price(), Some(950.0));

    // 1000: above the buy price, inside the band
    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.action, TickAction::Held);

    // 940 < 950 but the buy is still resting
    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.action, TickAction::OrdersStillOpen);
    assert_eq!(outcome.to, LifecycleState::BuyPending);

    gateway.fill_all();

    // 940 with no open orders: buy filled
    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.action, TickAction::FillConfirmed);
    assert_eq!(outcome.to, LifecycleState::AwaitingSellExit);

    // 1150: place sell at 1150 + 100
    let outcome = trader.tick().await.unwrap();
    assert!(matches!(outcome.action, TickAction::Placed(ref p) if p.side == Side::Sell));
    assert_eq!(outcome.to, LifecycleState::SellPending);
    assert_eq!(trader.tracker().sell_price(), Some(1250.0));

    // 1150 and 1060 are above the buy price but the sell is open
    for _ in 0..2 {
        let outcome = trader.tick().await.unwrap();
        assert_eq!(outcome.action, TickAction::OrdersStillOpen);
        assert_eq!(outcome.to, LifecycleState::SellPending);
    }

    assert_eq!(
        gateway.placed(),
        vec![(Side::Buy, 950.0), (Side::Sell, 1250.0)]
    );
}

#[tokio::test]
async fn test_cycle_completes_only_when_orders_closed() {
    let (mut trader, gateway) = trader(&[1000.0, 940.0, 940.0, 990.0, 990.0]);
    trader.reset().await.unwrap();

    trader.tick().await.unwrap(); // buy @ 950
    gateway.fill_all();
    trader.tick().await.unwrap(); // fill confirmed
    trader.tick().await.unwrap(); // sell @ 1040

    let outcome = trader.tick().await.unwrap();
    assert!(!outcome.completed_cycle());
    assert_eq!(outcome.to, LifecycleState::SellPending);

    gateway.fill_all();

    let outcome = trader.tick().await.unwrap();
    assert!(outcome.completed_cycle());
    assert_eq!(outcome.to, LifecycleState::AwaitingBuyEntry);

    // Every cycle-completing tick was preceded by an open-orders query
    let calls = gateway.calls();
    let last_price = calls.iter().rposition(|c| *c == Op::MarkPrice).unwrap();
    assert_eq!(calls[last_price + 1..].iter().filter(|c| **c == Op::HasOpenOrders).count(), 1);
}

#[tokio::test]
async fn test_buy_cancelled_when_price_runs_away() {
    let (mut trader, gateway) = trader(&[1000.0, 1060.5, 1100.0]);
    trader.reset().await.unwrap();

    trader.tick().await.unwrap(); // buy @ 950

    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.action, TickAction::Cancelled);
    assert_eq!(outcome.to, LifecycleState::AwaitingBuyEntry);
    assert_eq!(gateway.open_order_count(), 0);
    // Cancellation keeps the remembered price
    assert_eq!(trader.tracker().buy_price(), Some(950.0));

    // Re-entry at the new price
    trader.tick().await.unwrap();
    assert_eq!(trader.tracker().buy_price(), Some(1050.0));
    assert_eq!(trader.tracker().state(), LifecycleState::BuyPending);
}

#[tokio::test]
async fn test_sell_cancelled_when_price_collapses() {
    let (mut trader, gateway) = trader(&[1000.0, 940.0, 940.0, 839.0, 830.0]);
    trader.reset().await.unwrap();

    trader.tick().await.unwrap(); // buy @ 950
    gateway.fill_all();
    trader.tick().await.unwrap(); // fill confirmed
    trader.tick().await.unwrap(); // sell @ 1040

    // 839 < 950 - 100 - 10
    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.action, TickAction::Cancelled);
    assert_eq!(outcome.to, LifecycleState::AwaitingSellExit);
    assert_eq!(trader.tracker().buy_price(), Some(950.0));

    // Fresh sell one gap above the new price
    trader.tick().await.unwrap();
    assert_eq!(trader.tracker().sell_price(), Some(930.0));
    assert_eq!(trader.tracker().state(), LifecycleState::SellPending);
}

#[tokio::test]
async fn test_failed_placement_leaves_state_unchanged() {
    let (mut trader, gateway) = trader(&[1000.0, 1000.0]);
    trader.reset().await.unwrap();

    gateway.fail_next(Op::PlaceOrder, 1);

    let result = trader.tick().await;
    assert!(matches!(result, Err(TradeError::Gateway(_))));
    assert_eq!(trader.tracker().state(), LifecycleState::AwaitingBuyEntry);
    assert_eq!(trader.tracker().buy_price(), None);

    // Next tick retries naturally
    let outcome = trader.tick().await.unwrap();
    assert_eq!(outcome.to, LifecycleState::BuyPending);
}

#[tokio::test]
async fn test_failed_price_fetch_leaves_state_unchanged() {
    let (mut trader, gateway) = trader(&[1000.0, 1000.0]);
    trader.reset().await.unwrap();
    trader.tick().await.unwrap();

    let before = trader.tracker().snapshot();
    gateway.fail_next(Op::MarkPrice, 1);

    assert!(trader.tick().await.is_err());
    assert_eq!(trader.tracker().snapshot(), before);
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let (mut trader, gateway) = trader(&[1000.0, 940.0]);
    trader.reset().await.unwrap();
    trader.tick().await.unwrap();
    assert_eq!(gateway.open_order_count(), 1);

    trader.reset().await.unwrap();
    let once = trader.tracker().snapshot();

    trader.reset().await.unwrap();
    let twice = trader.tracker().snapshot();

    assert_eq!(once, twice);
    assert_eq!(twice.state, LifecycleState::AwaitingBuyEntry);
    assert_eq!(twice.buy_price, None);
    assert_eq!(twice.sell_price, None);
    assert_eq!(gateway.open_order_count(), 0);
}

#[tokio::test]
async fn test_failed_reset_keeps_tracker() {
    let (mut trader, gateway) = trader(&[1000.0]);
    trader.reset().await.unwrap();
    trader.tick().await.unwrap();

    let before = trader.tracker().snapshot();
    gateway.fail_next(Op::CancelAll, 1);

    assert!(trader.reset().await.is_err());
    assert_eq!(trader.tracker().snapshot(), before);
}

#[tokio::test]
async fn test_place_and_cancel_round_trip() {
    // reset -> nothing open; place -> open; cancel -> nothing open
    let (mut trader, gateway) = trader(&[1000.0]);

    trader.reset().await.unwrap();
    assert!(!gateway.has_open_orders(INSTRUMENT).await.unwrap());

    trader.tick().await.unwrap();
    assert!(gateway.has_open_orders(INSTRUMENT).await.unwrap());

    trader.reset().await.unwrap();
    assert!(!gateway.has_open_orders(INSTRUMENT).await.unwrap());
}

#[tokio::test]
async fn test_unconfigured_trader_never_calls_exchange() {
    let gateway = Arc::new(ScriptedGateway::new([1000.0]));
    let mut trader = GapTrader::new(StrategyConfig::default(), gateway.clone(), INSTRUMENT);

    assert!(matches!(
        trader.tick().await,
        Err(TradeError::Config(ConfigError::MissingField("gap")))
    ));
    assert!(matches!(trader.reset().await, Err(TradeError::Config(_))));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_non_positive_order_price_is_fatal() {
    // 30 - 100/2 < 0
    let (mut trader, gateway) = trader(&[30.0]);
    trader.reset().await.unwrap();

    let err = trader.tick().await.unwrap_err();
    assert!(matches!(err, TradeError::Invariant(_)));
    assert!(err.is_fatal());
    assert_eq!(gateway.count(Op::PlaceOrder), 0);
}
