//! Trading strategies
//!
//! Every strategy owns one recurring timer task. Each timer tick is spawned
//! as its own task so the timer never waits on the network, and a per-
//! instance busy flag skips a tick while the previous one is still in
//! flight. Stopping cancels the timer only; a tick already talking to the
//! chain runs to completion.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::{StrategyConfig, StrategyKind};
use crate::error::{Result, StrategyError};
use crate::executor::TradeExecutor;
use crate::logs::{LogLevel, LogSink};

pub mod dca;
pub mod grid;
pub mod threshold;

pub use dca::{DcaStats, DcaStrategy};
pub use grid::{GridLevel, GridStats, GridStrategy, LevelStatus};
pub use threshold::{ThresholdStats, ThresholdStrategy};

/// Consecutive unexpected failures before an escalation is logged
const FAILURE_ESCALATION: u32 = 5;

/// Everything a strategy needs from the outside world
#[derive(Clone)]
pub struct StrategyContext {
    pub bot_id: String,
    pub bot_name: String,
    pub executor: TradeExecutor,
    pub logs: LogSink,
}

impl StrategyContext {
    pub fn new(bot_id: &str, bot_name: &str, executor: TradeExecutor, logs: LogSink) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            bot_name: bot_name.to_string(),
            executor,
            logs,
        }
    }

    pub(crate) fn system_log(&self, level: LogLevel, message: impl Into<String>) {
        self.logs.system(level, Some(&self.bot_id), message);
    }

    pub(crate) fn trade_log(&self, level: LogLevel, message: impl Into<String>) {
        self.logs.trade(level, Some(&self.bot_id), message);
    }

    pub(crate) fn base_symbol(&self) -> &str {
        &self.executor.pair().base.symbol
    }

    pub(crate) fn quote_symbol(&self) -> &str {
        &self.executor.pair().quote.symbol
    }
}

/// Run state shared by the timer task, tick tasks and status readers
#[derive(Default)]
pub(crate) struct Lifecycle {
    running: AtomicBool,
    busy: AtomicBool,
    ticks: AtomicU64,
    failed: AtomicU64,
    error_streak: AtomicU32,
    timer: Mutex<Option<JoinHandle<()>>>,
    started_at: Mutex<Option<Instant>>,
}

/// Clears the busy flag when a tick finishes, even by panic
struct BusyGuard(Arc<Lifecycle>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

impl Lifecycle {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub(crate) fn has_active_timer(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed())
    }

    /// Flip to running and spawn the timer; the first tick fires immediately
    pub(crate) fn spawn<F, Fut>(self: &Arc<Self>, ctx: &StrategyContext, period: Duration, tick: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| StrategyError::NoRuntime(ctx.bot_id.clone()))?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StrategyError::AlreadyRunning(ctx.bot_id.clone()));
        }

        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.error_streak.store(0, Ordering::SeqCst);

        let lifecycle = Arc::clone(self);
        let ctx = ctx.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !lifecycle.is_running() {
                    break;
                }
                if lifecycle.busy.swap(true, Ordering::SeqCst) {
                    debug!(bot_id = %ctx.bot_id, "Previous tick still in flight, skipping");
                    continue;
                }
                lifecycle.ticks.fetch_add(1, Ordering::SeqCst);

                let guard = BusyGuard(Arc::clone(&lifecycle));
                let fut = tick();
                let tick_ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        guard.0.record_error(&tick_ctx, &e);
                    }
                    drop(guard);
                });
            }
        });

        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stop scheduling; returns false if already stopped
    pub(crate) fn halt(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        true
    }

    pub(crate) fn record_success(&self) {
        self.error_streak.store(0, Ordering::SeqCst);
    }

    /// Count and log a tick failure; never stops the timer
    pub(crate) fn record_error(&self, ctx: &StrategyContext, err: &StrategyError) {
        self.failed.fetch_add(1, Ordering::SeqCst);

        if err.is_insufficient_funds() {
            ctx.trade_log(
                LogLevel::Warning,
                format!("Trade skipped, insufficient balance (top up the wallet): {}", err),
            );
            return;
        }

        ctx.trade_log(LogLevel::Error, format!("Tick failed: {}", err));
        let streak = self.error_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak % FAILURE_ESCALATION == 0 {
            ctx.system_log(
                LogLevel::Error,
                format!("{} consecutive failures on {}, still running", streak, ctx.bot_name),
            );
        }
    }
}

/// Variant-specific statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyStats {
    Threshold(ThresholdStats),
    Dca(DcaStats),
    Grid(GridStats),
}

/// Point-in-time view of a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub bot_id: String,
    pub kind: StrategyKind,
    pub is_running: bool,
    pub elapsed_secs: Option<u64>,
    pub ticks: u64,
    pub stats: StrategyStats,
}

/// A live strategy instance, dispatched on its kind
#[derive(Clone)]
pub enum Strategy {
    Threshold(ThresholdStrategy),
    Dca(DcaStrategy),
    Grid(GridStrategy),
}

impl Strategy {
    /// Build an instance from a bot's config; rejects invalid configs
    pub fn from_config(ctx: StrategyContext, config: &StrategyConfig) -> Result<Self> {
        match config {
            StrategyConfig::Threshold(c) => Ok(Strategy::Threshold(ThresholdStrategy::new(ctx, c.clone())?)),
            StrategyConfig::Dca(c) => Ok(Strategy::Dca(DcaStrategy::new(ctx, c.clone())?)),
            StrategyConfig::Grid(c) => Ok(Strategy::Grid(GridStrategy::new(ctx, c.clone())?)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Threshold(_) => StrategyKind::Threshold,
            Strategy::Dca(_) => StrategyKind::Dca,
            Strategy::Grid(_) => StrategyKind::Grid,
        }
    }

    pub fn bot_id(&self) -> &str {
        match self {
            Strategy::Threshold(s) => s.bot_id(),
            Strategy::Dca(s) => s.bot_id(),
            Strategy::Grid(s) => s.bot_id(),
        }
    }

    /// Non-blocking; schedules an immediate first tick
    pub fn start(&self) -> Result<()> {
        match self {
            Strategy::Threshold(s) => s.start(),
            Strategy::Dca(s) => s.start(),
            Strategy::Grid(s) => s.start(),
        }
    }

    pub fn stop(&self, reason: &str) {
        match self {
            Strategy::Threshold(s) => s.stop(reason),
            Strategy::Dca(s) => s.stop(reason),
            Strategy::Grid(s) => s.stop(reason),
        }
    }

    pub fn status(&self) -> StrategyStatus {
        match self {
            Strategy::Threshold(s) => s.status(),
            Strategy::Dca(s) => s.status(),
            Strategy::Grid(s) => s.status(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }

    pub fn has_active_timer(&self) -> bool {
        self.lifecycle().has_active_timer()
    }

    /// Whether a tick is currently in flight
    pub fn is_busy(&self) -> bool {
        self.lifecycle().is_busy()
    }

    fn lifecycle(&self) -> &Arc<Lifecycle> {
        match self {
            Strategy::Threshold(s) => &s.lifecycle,
            Strategy::Dca(s) => &s.lifecycle,
            Strategy::Grid(s) => &s.lifecycle,
        }
    }
}

/// `numerator / denominator`, or None for an empty denominator
pub(crate) fn ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Human readable run time for stop summaries
pub(crate) fn format_elapsed(elapsed: Option<Duration>) -> String {
    let secs = elapsed.map(|d| d.as_secs()).unwrap_or(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(None), "0s");
        assert_eq!(format_elapsed(Some(Duration::from_secs(59))), "59s");
        assert_eq!(format_elapsed(Some(Duration::from_secs(61))), "1m01s");
        assert_eq!(format_elapsed(Some(Duration::from_secs(3723))), "1h02m03s");
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(Decimal::ONE, Decimal::ZERO), None);
        assert_eq!(ratio(Decimal::from(3), Decimal::from(2)), Some(Decimal::new(15, 1)));
    }
}
