//! Dollar-cost averaging - buy a fixed amount every interval until the budget runs out

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{format_elapsed, ratio, Lifecycle, StrategyContext, StrategyStats, StrategyStatus};
use crate::config::{DcaConfig, StrategyKind};
use crate::error::Result;
use crate::executor::SwapOrder;
use crate::logs::LogLevel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcaStats {
    pub executed_times: u64,
    /// Nominal quote spent, `executed_times * amount`
    pub total_spent: Decimal,
    pub total_budget: Decimal,
    pub remaining_budget: Decimal,
    /// `total_spent / total_budget` in percent
    pub progress_pct: Decimal,
    /// Quote actually swapped, net of slippage
    #[serde(default)]
    pub quote_swapped: Decimal,
    pub base_acquired: Decimal,
    pub avg_price: Option<Decimal>,
    /// Ticks skipped because the price was above `max_price`
    pub skipped_ticks: u64,
    pub failed_trades: u64,
    /// Budget exhausted and strategy stopped itself
    pub completed: bool,
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Default)]
struct DcaState {
    executed_times: u64,
    total_spent: Decimal,
    /// Quote actually swapped, for the average price
    quote_swapped: Decimal,
    base_acquired: Decimal,
    skipped_ticks: u64,
    completed: bool,
    last_price: Option<Decimal>,
}

#[derive(Clone)]
pub struct DcaStrategy {
    ctx: StrategyContext,
    config: DcaConfig,
    pub(super) lifecycle: Arc<Lifecycle>,
    state: Arc<Mutex<DcaState>>,
}

impl DcaStrategy {
    pub fn new(ctx: StrategyContext, config: DcaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx,
            config,
            lifecycle: Lifecycle::new(),
            state: Arc::new(Mutex::new(DcaState::default())),
        })
    }

    /// Carry progress over from a previous run of the same bot
    pub fn with_progress(self, previous: &DcaStats) -> Self {
        {
            let mut state = self.state();
            state.executed_times = previous.executed_times;
            state.total_spent = previous.total_spent.max(Decimal::ZERO);
            state.base_acquired = previous.base_acquired.max(Decimal::ZERO);
            // Older snapshots only carry the average
            state.quote_swapped = if previous.quote_swapped > Decimal::ZERO {
                previous.quote_swapped
            } else {
                previous.avg_price.unwrap_or_default() * state.base_acquired
            };
            state.skipped_ticks = previous.skipped_ticks;
        }
        self
    }

    pub fn bot_id(&self) -> &str {
        &self.ctx.bot_id
    }

    fn state(&self) -> MutexGuard<'_, DcaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start(&self) -> Result<()> {
        let this = self.clone();
        self.lifecycle.spawn(&self.ctx, self.config.interval(), move || {
            let this = this.clone();
            async move { this.tick().await }
        })?;

        let spent = self.state().total_spent;
        let max_price = self
            .config
            .max_price
            .map(|p| format!(", max price {}", p))
            .unwrap_or_default();
        self.ctx.system_log(
            LogLevel::Info,
            format!(
                "{} started: {} {} every {}s, {} / {} spent{}",
                self.ctx.bot_name,
                self.config.amount,
                self.ctx.quote_symbol(),
                self.config.interval_secs,
                spent,
                self.config.total_budget,
                max_price
            ),
        );
        Ok(())
    }

    pub fn stop(&self, reason: &str) {
        if !self.lifecycle.halt() {
            return;
        }
        let stats = self.snapshot();
        self.ctx.system_log(
            LogLevel::Info,
            format!(
                "{} stopped ({}) after {}: {} buys, {} / {} {} spent ({}%)",
                self.ctx.bot_name,
                reason,
                format_elapsed(self.lifecycle.elapsed()),
                stats.executed_times,
                stats.total_spent,
                stats.total_budget,
                self.ctx.quote_symbol(),
                stats.progress_pct
            ),
        );
    }

    /// Terminal self-stop once the next buy would overrun the budget
    fn complete(&self) {
        if !self.lifecycle.halt() {
            return;
        }
        self.state().completed = true;
        let stats = self.snapshot();
        self.ctx.system_log(
            LogLevel::Success,
            format!(
                "{} completed: budget exhausted after {} buys, {} {} spent for {} {}",
                self.ctx.bot_name,
                stats.executed_times,
                stats.total_spent,
                self.ctx.quote_symbol(),
                stats.base_acquired,
                self.ctx.base_symbol()
            ),
        );
    }

    pub fn snapshot(&self) -> DcaStats {
        let state = self.state();
        let budget = self.config.total_budget;
        let progress_pct = ratio(state.total_spent * Decimal::ONE_HUNDRED, budget)
            .unwrap_or_default()
            .round_dp(2);

        DcaStats {
            executed_times: state.executed_times,
            total_spent: state.total_spent,
            total_budget: budget,
            remaining_budget: (budget - state.total_spent).max(Decimal::ZERO),
            progress_pct,
            quote_swapped: state.quote_swapped,
            base_acquired: state.base_acquired,
            avg_price: ratio(state.quote_swapped, state.base_acquired),
            skipped_ticks: state.skipped_ticks,
            failed_trades: self.lifecycle.failed(),
            completed: state.completed,
            last_price: state.last_price,
        }
    }

    pub fn status(&self) -> StrategyStatus {
        StrategyStatus {
            bot_id: self.ctx.bot_id.clone(),
            kind: StrategyKind::Dca,
            is_running: self.lifecycle.is_running(),
            elapsed_secs: self.lifecycle.elapsed().map(|d| d.as_secs()),
            ticks: self.lifecycle.ticks(),
            stats: StrategyStats::Dca(self.snapshot()),
        }
    }

    async fn tick(&self) -> Result<()> {
        let spent = self.state().total_spent;
        if spent + self.config.amount > self.config.total_budget {
            self.complete();
            return Ok(());
        }

        let price = self.ctx.executor.fetch_price().await?;
        self.state().last_price = Some(price);

        if let Some(max_price) = self.config.max_price {
            if price > max_price {
                self.state().skipped_ticks += 1;
                self.ctx.trade_log(
                    LogLevel::Info,
                    format!(
                        "{} at {} is above max price {}, skipping this round",
                        self.ctx.base_symbol(),
                        price,
                        max_price
                    ),
                );
                return Ok(());
            }
        }

        let order = SwapOrder::buy(self.config.amount, price).from_bot(&self.ctx.bot_id, StrategyKind::Dca);
        let fill = self.ctx.executor.execute(&order).await?;

        let (executed, spent) = {
            let mut state = self.state();
            state.executed_times += 1;
            state.total_spent += self.config.amount;
            state.quote_swapped += fill.amount_in;
            state.base_acquired += fill.amount_out;
            (state.executed_times, state.total_spent)
        };
        self.lifecycle.record_success();

        self.ctx.trade_log(
            LogLevel::Success,
            format!(
                "DCA buy #{}: {} {} -> {} {} @ {} ({} / {} spent, {})",
                executed,
                fill.amount_in,
                self.ctx.quote_symbol(),
                fill.amount_out,
                self.ctx.base_symbol(),
                price,
                spent,
                self.config.total_budget,
                fill.tx_ref
            ),
        );
        Ok(())
    }
}
