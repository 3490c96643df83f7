//! Grid strategy - a ladder of price levels between a lower and upper bound
//!
//! A pending level buys once the price trades at or below it. When the price
//! reaches the next level up, the base bought at the level below is sold and
//! that level is re-armed after a cooldown.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{format_elapsed, Lifecycle, StrategyContext, StrategyStats, StrategyStatus};
use crate::config::{GridConfig, GridType, StrategyKind};
use crate::error::{Result, StrategyError};
use crate::executor::SwapOrder;
use crate::logs::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Pending,
    Bought,
    Sold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    pub status: LevelStatus,
    /// Quote committed when this level buys
    pub amount: Decimal,
    /// Execution price of the open buy
    pub buy_price: Option<Decimal>,
    pub buy_ref: Option<String>,
    pub sell_ref: Option<String>,
}

impl GridLevel {
    fn new(index: usize, price: Decimal, amount: Decimal) -> Self {
        Self {
            index,
            price,
            status: LevelStatus::Pending,
            amount,
            buy_price: None,
            buy_ref: None,
            sell_ref: None,
        }
    }

    /// Base units held by an open buy
    pub fn base_amount(&self) -> Decimal {
        let price = self.buy_price.unwrap_or(self.price);
        if price.is_zero() {
            Decimal::ZERO
        } else {
            self.amount / price
        }
    }
}

/// `grid_count + 1` ascending levels, both bounds included
pub fn build_levels(config: &GridConfig) -> Result<Vec<GridLevel>> {
    config.validate()?;

    let count = config.grid_count as usize;
    let amount = config.amount_per_grid();
    let lower = config.lower_price;
    let upper = config.upper_price;
    let n = Decimal::from(config.grid_count);

    let mut prices = Vec::with_capacity(count + 1);
    match config.grid_type {
        GridType::Arithmetic => {
            let step = (upper - lower) / n;
            for i in 0..count {
                prices.push(lower + step * Decimal::from(i as u64));
            }
        }
        GridType::Geometric => {
            let ratio = (upper / lower)
                .checked_powd(Decimal::ONE / n)
                .ok_or_else(|| {
                    StrategyError::InvalidConfig(format!(
                        "cannot compute geometric ratio for {}..{} over {} grids",
                        lower, upper, config.grid_count
                    ))
                })?;
            let mut price = lower;
            for _ in 0..count {
                prices.push(price);
                price *= ratio;
            }
        }
    }
    // Pin the top rung so rounding never leaves it short of the bound
    prices.push(upper);

    Ok(prices
        .into_iter()
        .enumerate()
        .map(|(index, price)| GridLevel::new(index, price, amount))
        .collect())
}

/// Unrealized P&L of open buys at `price`
pub fn float_pnl(levels: &[GridLevel], price: Decimal) -> Decimal {
    levels
        .iter()
        .filter(|level| level.status == LevelStatus::Bought && !level.price.is_zero())
        .map(|level| (price - level.price) * (level.amount / level.price))
        .sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    pub grid_type: GridType,
    pub amount_per_grid: Decimal,
    pub levels: Vec<GridLevel>,
    pub pending_levels: usize,
    pub bought_levels: usize,
    pub buy_count: u64,
    pub sell_count: u64,
    pub realized_profit: Decimal,
    pub float_pnl: Decimal,
    pub failed_trades: u64,
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Default)]
struct GridState {
    levels: Vec<GridLevel>,
    buy_count: u64,
    sell_count: u64,
    realized_profit: Decimal,
    last_price: Option<Decimal>,
}

#[derive(Clone)]
pub struct GridStrategy {
    ctx: StrategyContext,
    config: GridConfig,
    pub(super) lifecycle: Arc<Lifecycle>,
    state: Arc<Mutex<GridState>>,
}

impl GridStrategy {
    pub fn new(ctx: StrategyContext, config: GridConfig) -> Result<Self> {
        let levels = build_levels(&config)?;
        Ok(Self {
            ctx,
            config,
            lifecycle: Lifecycle::new(),
            state: Arc::new(Mutex::new(GridState {
                levels,
                ..Default::default()
            })),
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.ctx.bot_id
    }

    fn state(&self) -> MutexGuard<'_, GridState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn levels(&self) -> Vec<GridLevel> {
        self.state().levels.clone()
    }

    pub fn start(&self) -> Result<()> {
        if self.lifecycle.is_running() {
            return Err(StrategyError::AlreadyRunning(self.ctx.bot_id.clone()));
        }
        let levels = build_levels(&self.config)?;
        let first = levels.first().map(|l| l.price).unwrap_or_default();
        {
            let mut state = self.state();
            *state = GridState {
                levels,
                ..Default::default()
            };
        }

        let this = self.clone();
        self.lifecycle.spawn(&self.ctx, self.config.interval(), move || {
            let this = this.clone();
            async move { this.tick().await }
        })?;

        self.ctx.system_log(
            LogLevel::Info,
            format!(
                "{} started: {:?} grid of {} levels from {} to {}, {} {} per grid",
                self.ctx.bot_name,
                self.config.grid_type,
                self.config.grid_count + 1,
                first,
                self.config.upper_price,
                self.config.amount_per_grid(),
                self.ctx.quote_symbol()
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
                "{} stopped ({}) after {}: {} buys, {} sells, realized {} / float {} {}",
                self.ctx.bot_name,
                reason,
                format_elapsed(self.lifecycle.elapsed()),
                stats.buy_count,
                stats.sell_count,
                stats.realized_profit,
                stats.float_pnl,
                self.ctx.quote_symbol()
            ),
        );
    }

    pub fn snapshot(&self) -> GridStats {
        let state = self.state();
        let float = state
            .last_price
            .map(|p| float_pnl(&state.levels, p))
            .unwrap_or_default();

        GridStats {
            grid_type: self.config.grid_type,
            amount_per_grid: self.config.amount_per_grid(),
            levels: state.levels.clone(),
            pending_levels: count_status(&state.levels, LevelStatus::Pending),
            bought_levels: count_status(&state.levels, LevelStatus::Bought),
            buy_count: state.buy_count,
            sell_count: state.sell_count,
            realized_profit: state.realized_profit,
            float_pnl: float,
            failed_trades: self.lifecycle.failed(),
            last_price: state.last_price,
        }
    }

    pub fn status(&self) -> StrategyStatus {
        StrategyStatus {
            bot_id: self.ctx.bot_id.clone(),
            kind: StrategyKind::Grid,
            is_running: self.lifecycle.is_running(),
            elapsed_secs: self.lifecycle.elapsed().map(|d| d.as_secs()),
            ticks: self.lifecycle.ticks(),
            stats: StrategyStats::Grid(self.snapshot()),
        }
    }

    async fn tick(&self) -> Result<()> {
        let price = self.ctx.executor.fetch_price().await?;
        let count = {
            let mut state = self.state();
            state.last_price = Some(price);
            state.levels.len()
        };

        for i in 0..count {
            let should_buy = {
                let state = self.state();
                let level = &state.levels[i];
                level.status == LevelStatus::Pending && price <= level.price
            };
            if should_buy {
                if let Err(e) = self.buy_level(i, price).await {
                    self.lifecycle.record_error(&self.ctx, &e);
                }
            }

            if i == 0 {
                continue;
            }
            let should_sell = {
                let state = self.state();
                price >= state.levels[i].price && state.levels[i - 1].status == LevelStatus::Bought
            };
            if should_sell {
                if let Err(e) = self.sell_level(i - 1, price).await {
                    self.lifecycle.record_error(&self.ctx, &e);
                }
            }
        }
        Ok(())
    }

    async fn buy_level(&self, index: usize, price: Decimal) -> Result<()> {
        let (level_price, amount) = {
            let state = self.state();
            (state.levels[index].price, state.levels[index].amount)
        };

        let order = SwapOrder::buy(amount, price).from_bot(&self.ctx.bot_id, StrategyKind::Grid);
        let fill = self.ctx.executor.execute(&order).await?;

        {
            let mut state = self.state();
            let level = &mut state.levels[index];
            level.status = LevelStatus::Bought;
            level.buy_price = Some(price);
            level.buy_ref = Some(fill.tx_ref.clone());
            level.sell_ref = None;
            state.buy_count += 1;
        }
        self.lifecycle.record_success();

        self.ctx.trade_log(
            LogLevel::Success,
            format!(
                "Grid #{} ({}) BUY {} {} -> {} {} @ {} ({})",
                index,
                level_price,
                fill.amount_in,
                self.ctx.quote_symbol(),
                fill.amount_out,
                self.ctx.base_symbol(),
                price,
                fill.tx_ref
            ),
        );
        Ok(())
    }

    async fn sell_level(&self, index: usize, price: Decimal) -> Result<()> {
        let (level_price, amount, base_amount) = {
            let state = self.state();
            let level = &state.levels[index];
            (level.price, level.amount, level.base_amount())
        };

        let order = SwapOrder::sell(base_amount, price).from_bot(&self.ctx.bot_id, StrategyKind::Grid);
        let fill = self.ctx.executor.execute(&order).await?;
        let profit = fill.amount_out - amount;

        {
            let mut state = self.state();
            let level = &mut state.levels[index];
            level.status = LevelStatus::Sold;
            level.sell_ref = Some(fill.tx_ref.clone());
            state.sell_count += 1;
            state.realized_profit += profit;
        }
        self.lifecycle.record_success();

        self.ctx.trade_log(
            LogLevel::Success,
            format!(
                "Grid #{} ({}) SELL {} {} -> {} {} @ {}, profit {} ({})",
                index,
                level_price,
                fill.amount_in,
                self.ctx.base_symbol(),
                fill.amount_out,
                self.ctx.quote_symbol(),
                price,
                profit,
                fill.tx_ref
            ),
        );

        self.schedule_rearm(index);
        Ok(())
    }

    /// Return a sold level to pending once the cooldown has passed
    fn schedule_rearm(&self, index: usize) {
        let state = Arc::clone(&self.state);
        let cooldown = self.config.rearm_cooldown();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(level) = state.levels.get_mut(index) {
                if level.status == LevelStatus::Sold {
                    level.status = LevelStatus::Pending;
                    level.buy_price = None;
                    level.buy_ref = None;
                }
            }
        });
    }
}

fn count_status(levels: &[GridLevel], status: LevelStatus) -> usize {
    levels.iter().filter(|l| l.status == status).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(grid_type: GridType, lower: i64, upper: i64, count: u32) -> GridConfig {
        GridConfig {
            lower_price: Decimal::from(lower),
            upper_price: Decimal::from(upper),
            grid_count: count,
            total_investment: Decimal::from(100),
            grid_type,
            check_interval_secs: 30,
            rearm_cooldown_secs: 5,
            slippage_pct: None,
        }
    }

    #[test]
    fn test_arithmetic_levels() {
        let levels = build_levels(&config(GridType::Arithmetic, 10, 20, 2)).unwrap();
        let prices: Vec<Decimal> = levels.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![Decimal::from(10), Decimal::from(15), Decimal::from(20)]);
        assert!(levels.iter().all(|l| l.status == LevelStatus::Pending));
        assert_eq!(levels[0].amount, Decimal::from(50));
    }

    #[test]
    fn test_arithmetic_constant_step() {
        let levels = build_levels(&config(GridType::Arithmetic, 100, 200, 7)).unwrap();
        assert_eq!(levels.len(), 8);
        let step = levels[1].price - levels[0].price;
        let tolerance = Decimal::new(1, 20);
        for pair in levels.windows(2) {
            assert!(((pair[1].price - pair[0].price) - step).abs() < tolerance);
        }
        assert_eq!(levels[7].price, Decimal::from(200));
    }

    #[test]
    fn test_geometric_constant_ratio() {
        let levels = build_levels(&config(GridType::Geometric, 10, 40, 4)).unwrap();
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0].price, Decimal::from(10));
        assert_eq!(levels[4].price, Decimal::from(40));

        // 4^(1/4) = sqrt(2)
        let expected = Decimal::from(2).sqrt().unwrap();
        let tolerance = Decimal::new(1, 6);
        for pair in levels.windows(2) {
            let ratio = pair[1].price / pair[0].price;
            assert!((ratio - expected).abs() < tolerance, "ratio {} != {}", ratio, expected);
        }
    }

    #[test]
    fn test_rejects_small_grids() {
        let mut cfg = config(GridType::Arithmetic, 10, 20, 200);
        cfg.total_investment = Decimal::from(100);
        assert!(matches!(build_levels(&cfg), Err(StrategyError::InvalidConfig(_))));
    }

    #[test]
    fn test_float_pnl() {
        let mut levels = build_levels(&config(GridType::Arithmetic, 10, 20, 2)).unwrap();
        levels[0].status = LevelStatus::Bought;
        levels[2].status = LevelStatus::Bought;
        // (12 - 10) * 50/10 + (12 - 20) * 50/20
        assert_eq!(float_pnl(&levels, Decimal::from(12)), Decimal::from(-10));
        assert_eq!(float_pnl(&levels, Decimal::from(20)), Decimal::from(50));
    }

    #[test]
    fn test_base_amount_uses_buy_price() {
        let mut level = GridLevel::new(0, Decimal::from(10), Decimal::from(50));
        assert_eq!(level.base_amount(), Decimal::from(5));
        level.buy_price = Some(Decimal::from(8));
        assert_eq!(level.base_amount(), Decimal::new(625, 2));
    }
}
