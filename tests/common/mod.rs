//! In-memory exchange and order log shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use gapbot::api::{ExchangeGateway, GatewayError};
use gapbot::config::{StrategyConfig, TESTNET_HOST};
use gapbot::models::{AccessToken, OrderPlacement, OrderRecord, OrderState, Side};
use gapbot::persistence::{OrderLog, PersistenceError};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const INSTRUMENT: &str = "BTC-PERPETUAL";

pub fn test_config() -> StrategyConfig {
    StrategyConfig::new(100.0, 10.0, TESTNET_HOST, "test-id", "test-secret")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Authenticate,
    MarkPrice,
    PlaceOrder,
    CancelAll,
    HasOpenOrders,
    OrderHistory,
}

#[derive(Default)]
struct Book {
    prices: VecDeque<f64>,
    last_price: Option<f64>,
    open: Vec<OrderPlacement>,
    history: Vec<OrderRecord>,
    next_id: u64,
    calls: Vec<Op>,
    placed: Vec<(Side, f64)>,
    failures: HashMap<Op, u32>,
    instant_fills: bool,
}

/// Exchange double fed with a script of mark prices.
///
/// Orders rest until `fill_all` or a cancel. When the script runs out the last
/// price repeats.
#[derive(Default)]
pub struct ScriptedGateway {
    book: Mutex<Book>,
}

impl ScriptedGateway {
    pub fn new(prices: impl IntoIterator<Item = f64>) -> Self {
        let gateway = Self::default();
        gateway.book.lock().unwrap().prices = prices.into_iter().collect();
        gateway
    }

    /// Orders fill the moment they are placed
    pub fn with_instant_fills(self) -> Self {
        self.book.lock().unwrap().instant_fills = true;
        self
    }

    pub fn push_prices(&self, prices: impl IntoIterator<Item = f64>) {
        self.book.lock().unwrap().prices.extend(prices);
    }

    /// Make the next `times` calls of `op` fail
    pub fn fail_next(&self, op: Op, times: u32) {
        self.book.lock().unwrap().failures.insert(op, times);
    }

    /// Every resting order fills
    pub fn fill_all(&self) {
        let mut book = self.book.lock().unwrap();
        let filled: Vec<String> = book.open.drain(..).map(|o| o.order_id).collect();
        for record in book.history.iter_mut() {
            if filled.contains(&record.id) {
                record.status = OrderState::Filled;
            }
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.book.lock().unwrap().open.len()
    }

    pub fn calls(&self) -> Vec<Op> {
        self.book.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    pub fn placed(&self) -> Vec<(Side, f64)> {
        self.book.lock().unwrap().placed.clone()
    }

    fn enter(&self, op: Op) -> Result<(), GatewayError> {
        let mut book = self.book.lock().unwrap();
        book.calls.push(op);

        if let Some(remaining) = book.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::RequestFailed(format!("injected {:?} failure", op)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn authenticate(
        &self,
        client_id: &str,
        _client_secret: &str,
    ) -> Result<AccessToken, GatewayError> {
        self.enter(Op::Authenticate)?;
        Ok(AccessToken::new(format!("token-{}", client_id)))
    }

    async fn get_mark_price(&self, _instrument: &str) -> Result<f64, GatewayError> {
        self.enter(Op::MarkPrice)?;

        let mut book = self.book.lock().unwrap();
        let price = match book.prices.pop_front() {
            Some(price) => price,
            None => book
                .last_price
                .ok_or_else(|| GatewayError::InvalidResponse("price script is empty".into()))?,
        };
        book.last_price = Some(price);
        Ok(price)
    }

    async fn place_order(
        &self,
        side: Side,
        _instrument: &str,
        price: f64,
    ) -> Result<OrderPlacement, GatewayError> {
        self.enter(Op::PlaceOrder)?;

        let mut book = self.book.lock().unwrap();
        book.next_id += 1;

        let placement = OrderPlacement {
            order_id: format!("order-{}", book.next_id),
            side,
            price,
            amount: 10.0,
            state: OrderState::Open,
        };

        let status = if book.instant_fills {
            OrderState::Filled
        } else {
            book.open.push(placement.clone());
            OrderState::Open
        };

        book.placed.push((side, price));
        book.history.push(OrderRecord {
            id: placement.order_id.clone(),
            side,
            price,
            amount: placement.amount,
            status,
        });

        Ok(placement)
    }

    async fn cancel_all_orders(&self, _instrument: &str) -> Result<(), GatewayError> {
        self.enter(Op::CancelAll)?;

        let mut book = self.book.lock().unwrap();
        let cancelled: Vec<String> = book.open.drain(..).map(|o| o.order_id).collect();
        for record in book.history.iter_mut() {
            if cancelled.contains(&record.id) {
                record.status = OrderState::Cancelled;
            }
        }
        Ok(())
    }

    async fn has_open_orders(&self, _instrument: &str) -> Result<bool, GatewayError> {
        self.enter(Op::HasOpenOrders)?;
        Ok(!self.book.lock().unwrap().open.is_empty())
    }

    async fn order_history(&self, _instrument: &str) -> Result<Vec<OrderRecord>, GatewayError> {
        self.enter(Op::OrderHistory)?;
        Ok(self.book.lock().unwrap().history.clone())
    }
}

/// Order log keyed by order id
#[derive(Default)]
pub struct MemoryOrderLog {
    rows: Mutex<HashMap<String, OrderRecord>>,
}

impl MemoryOrderLog {
    pub fn rows(&self) -> HashMap<String, OrderRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderLog for MemoryOrderLog {
    async fn upsert_orders(&self, orders: &[OrderRecord]) -> Result<usize, PersistenceError> {
        let mut rows = self.rows.lock().unwrap();
        for order in orders {
            rows.entry(order.id.clone())
                .and_modify(|existing| existing.status = order.status)
                .or_insert_with(|| order.clone());
        }
        Ok(orders.len())
    }
}

/// Order log whose database is down
pub struct BrokenOrderLog;

#[async_trait]
impl OrderLog for BrokenOrderLog {
    async fn upsert_orders(&self, _orders: &[OrderRecord]) -> Result<usize, PersistenceError> {
        Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
    }
}
