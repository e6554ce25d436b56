use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::api::ExchangeGateway;
use crate::execution::{GapTrader, LifecycleSnapshot, TickAction, TickOutcome, TradeError};
use crate::persistence::OrderLog;

/// Pacing and failure policy for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Pause between consecutive ticks
    pub tick_interval: Duration,
    /// Extra pause after a failed tick, doubled per consecutive failure
    pub failure_backoff: Duration,
    pub max_failure_backoff: Duration,
    /// Abort the run after this many failed ticks in a row
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(2),
            max_failure_backoff: Duration::from_secs(60),
            max_consecutive_failures: Some(10),
        }
    }
}

impl SessionSettings {
    /// Back-to-back ticks, failures never abort the run
    pub fn immediate() -> Self {
        Self {
            tick_interval: Duration::ZERO,
            failure_backoff: Duration::ZERO,
            max_failure_backoff: Duration::ZERO,
            max_consecutive_failures: None,
        }
    }

    /// Pause before the next tick given the current failure streak
    pub fn delay_before_next(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.tick_interval;
        }

        let exponent = (consecutive_failures - 1).min(16);
        let backoff = self
            .failure_backoff
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_failure_backoff);

        self.tick_interval + backoff
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ticks attempted, failed ones included
    pub ticks: u64,
    pub failed_ticks: u64,
    pub transitions: u64,
    pub orders_placed: u64,
    pub cancellations: u64,
    pub completed_cycles: u64,
    /// Rows handed to the order log, `None` when logging is off or failed
    pub orders_logged: Option<usize>,
    /// Tracker state right before the closing reset
    pub last_state: LifecycleSnapshot,
}

impl SessionReport {
    fn new(initial: LifecycleSnapshot) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            ticks: 0,
            failed_ticks: 0,
            transitions: 0,
            orders_placed: 0,
            cancellations: 0,
            completed_cycles: 0,
            orders_logged: None,
            last_state: initial,
        }
    }

    fn record(&mut self, outcome: &TickOutcome) {
        if outcome.transitioned() {
            self.transitions += 1;
        }
        if outcome.completed_cycle() {
            self.completed_cycles += 1;
        }
        match outcome.action {
            TickAction::Placed(_) => self.orders_placed += 1,
            TickAction::Cancelled => self.cancellations += 1,
            _ => {}
        }
    }
}

/// Drives bounded trading sessions: reset, N ticks, optional order log, reset.
pub struct SessionController<G: ExchangeGateway + ?Sized> {
    trader: GapTrader<G>,
    order_log: Option<Box<dyn OrderLog>>,
    settings: SessionSettings,
}

impl<G: ExchangeGateway + ?Sized> SessionController<G> {
    pub fn new(trader: GapTrader<G>, settings: SessionSettings) -> Self {
        Self {
            trader,
            order_log: None,
            settings,
        }
    }

    /// Persist the exchange's order history at the end of every session
    pub fn with_order_log(mut self, order_log: Box<dyn OrderLog>) -> Self {
        self.order_log = Some(order_log);
        self
    }

    pub fn trader(&self) -> &GapTrader<G> {
        &self.trader
    }

    /// Run exactly `iterations` ticks bracketed by resets.
    ///
    /// Configuration is validated before any exchange call. A failed tick
    /// consumes its iteration and leaves the lifecycle unchanged; fatal errors
    /// and an exhausted failure budget abort the run after a best-effort reset.
    pub async fn run(&mut self, iterations: u64) -> Result<SessionReport, TradeError> {
        self.trader.config().validate()?;

        tracing::info!(
            "Starting session: {} iterations on {}",
            iterations,
            self.trader.instrument()
        );

        self.trader.reset().await?;

        let mut report = SessionReport::new(self.trader.tracker().snapshot());
        let mut consecutive_failures: u32 = 0;

        for iteration in 0..iterations {
            if iteration > 0 {
                let delay = self.settings.delay_before_next(consecutive_failures);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            report.ticks += 1;

            match self.trader.tick().await {
                Ok(outcome) => {
                    consecutive_failures = 0;
                    report.record(&outcome);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Tick {} failed fatally: {}", iteration + 1, e);
                    self.abort_reset().await;
                    return Err(e);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    report.failed_ticks += 1;
                    tracing::warn!(
                        "Tick {}/{} failed ({} in a row): {}",
                        iteration + 1,
                        iterations,
                        consecutive_failures,
                        e
                    );

                    if let Some(max) = self.settings.max_consecutive_failures {
                        if consecutive_failures >= max {
                            tracing::error!(
                                "Aborting session after {} consecutive failed ticks",
                                consecutive_failures
                            );
                            self.abort_reset().await;
                            return Err(e);
                        }
                    }
                }
            }
        }

        report.last_state = self.trader.tracker().snapshot();
        report.orders_logged = self.log_orders().await;

        self.trader.reset().await?;
        report.finished_at = Utc::now();

        tracing::info!(
            "Session finished: {} ticks ({} failed), {} orders placed, {} cancellations, {} cycles",
            report.ticks,
            report.failed_ticks,
            report.orders_placed,
            report.cancellations,
            report.completed_cycles
        );

        Ok(report)
    }

    /// Fetch the order history and hand it to the order log
    async fn log_orders(&self) -> Option<usize> {
        let order_log = self.order_log.as_ref()?;

        let orders = match self
            .trader
            .gateway()
            .order_history(self.trader.instrument())
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!("Failed to fetch order history, skipping order log: {}", e);
                return None;
            }
        };

        match order_log.upsert_orders(&orders).await {
            Ok(count) => {
                tracing::info!("Logged {} orders", count);
                Some(count)
            }
            Err(e) => {
                tracing::warn!("Failed to log orders: {}", e);
                None
            }
        }
    }

    async fn abort_reset(&mut self) {
        if let Err(e) = self.trader.reset().await {
            tracing::error!("Reset after aborted session failed: {}", e);
        }
    }
}
