//! Threshold strategy - buy below one price, sell above another

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{format_elapsed, ratio, Lifecycle, StrategyContext, StrategyStats, StrategyStatus};
use crate::config::{StrategyKind, ThresholdConfig};
use crate::error::Result;
use crate::executor::SwapOrder;
use crate::logs::LogLevel;

/// Idle ticks between heartbeat log lines
const HEARTBEAT_EVERY: u64 = 10;

/// What a single tick should do at a given price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Buy wins when both thresholds fire
pub fn decide(price: Decimal, config: &ThresholdConfig) -> Signal {
    if price <= config.buy_threshold {
        Signal::Buy
    } else if price >= config.sell_threshold {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    pub buy_count: u64,
    /// Quote spent on buys
    pub buy_volume: Decimal,
    /// Base received from buys
    pub base_bought: Decimal,
    pub sell_count: u64,
    /// Base spent on sells
    pub sell_volume: Decimal,
    /// Quote received from sells
    pub sell_proceeds: Decimal,
    pub failed_trades: u64,
    pub avg_buy_price: Option<Decimal>,
    pub avg_sell_price: Option<Decimal>,
    pub net_pnl: Decimal,
    pub last_price: Option<Decimal>,
}

impl ThresholdStats {
    fn refresh_derived(&mut self) {
        self.avg_buy_price = ratio(self.buy_volume, self.base_bought);
        self.avg_sell_price = ratio(self.sell_proceeds, self.sell_volume);
        self.net_pnl = self.sell_proceeds - self.buy_volume;
    }
}

#[derive(Clone)]
pub struct ThresholdStrategy {
    ctx: StrategyContext,
    config: ThresholdConfig,
    pub(super) lifecycle: Arc<Lifecycle>,
    stats: Arc<Mutex<ThresholdStats>>,
}

impl ThresholdStrategy {
    pub fn new(ctx: StrategyContext, config: ThresholdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx,
            config,
            lifecycle: Lifecycle::new(),
            stats: Arc::new(Mutex::new(ThresholdStats::default())),
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.ctx.bot_id
    }

    fn stats(&self) -> MutexGuard<'_, ThresholdStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start(&self) -> Result<()> {
        let this = self.clone();
        self.lifecycle.spawn(&self.ctx, self.config.interval(), move || {
            let this = this.clone();
            async move { this.tick().await }
        })?;

        self.ctx.system_log(
            LogLevel::Info,
            format!(
                "{} started: buy <= {} / sell >= {} {}, {} {} per trade, every {}s",
                self.ctx.bot_name,
                self.config.buy_threshold,
                self.config.sell_threshold,
                self.ctx.quote_symbol(),
                self.config.trade_amount,
                self.ctx.quote_symbol(),
                self.config.check_interval_secs
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
                "{} stopped ({}) after {}: {} buys, {} sells, {} failed, net P&L {} {}",
                self.ctx.bot_name,
                reason,
                format_elapsed(self.lifecycle.elapsed()),
                stats.buy_count,
                stats.sell_count,
                stats.failed_trades,
                stats.net_pnl,
                self.ctx.quote_symbol()
            ),
        );
    }

    pub fn snapshot(&self) -> ThresholdStats {
        let mut stats = self.stats().clone();
        stats.failed_trades = self.lifecycle.failed();
        stats
    }

    pub fn status(&self) -> StrategyStatus {
        StrategyStatus {
            bot_id: self.ctx.bot_id.clone(),
            kind: StrategyKind::Threshold,
            is_running: self.lifecycle.is_running(),
            elapsed_secs: self.lifecycle.elapsed().map(|d| d.as_secs()),
            ticks: self.lifecycle.ticks(),
            stats: StrategyStats::Threshold(self.snapshot()),
        }
    }

    async fn tick(&self) -> Result<()> {
        let price = self.ctx.executor.fetch_price().await?;
        self.stats().last_price = Some(price);

        match decide(price, &self.config) {
            Signal::Buy => self.buy(price).await,
            Signal::Sell => self.sell(price).await,
            Signal::Hold => {
                let tick = self.lifecycle.ticks();
                if tick % HEARTBEAT_EVERY == 0 {
                    self.ctx.system_log(
                        LogLevel::Info,
                        format!(
                            "{} watching {} at {} (tick {}), waiting for <= {} or >= {}",
                            self.ctx.bot_name,
                            self.ctx.base_symbol(),
                            price,
                            tick,
                            self.config.buy_threshold,
                            self.config.sell_threshold
                        ),
                    );
                }
                Ok(())
            }
        }
    }

    async fn buy(&self, price: Decimal) -> Result<()> {
        self.ctx.trade_log(
            LogLevel::Info,
            format!(
                "{} at {} <= {}, buying with {} {}",
                self.ctx.base_symbol(),
                price,
                self.config.buy_threshold,
                self.config.trade_amount,
                self.ctx.quote_symbol()
            ),
        );

        let order = SwapOrder::buy(self.config.trade_amount, price)
            .from_bot(&self.ctx.bot_id, StrategyKind::Threshold);
        let fill = self.ctx.executor.execute(&order).await?;

        {
            let mut stats = self.stats();
            stats.buy_count += 1;
            stats.buy_volume += fill.amount_in;
            stats.base_bought += fill.amount_out;
            stats.refresh_derived();
        }
        self.lifecycle.record_success();

        self.ctx.trade_log(
            LogLevel::Success,
            format!(
                "BUY {} {} -> {} {} @ {} ({})",
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

    async fn sell(&self, price: Decimal) -> Result<()> {
        let base_amount = self.config.trade_amount / price;
        self.ctx.trade_log(
            LogLevel::Info,
            format!(
                "{} at {} >= {}, selling {} {}",
                self.ctx.base_symbol(),
                price,
                self.config.sell_threshold,
                base_amount,
                self.ctx.base_symbol()
            ),
        );

        let order = SwapOrder::sell(base_amount, price)
            .from_bot(&self.ctx.bot_id, StrategyKind::Threshold);
        let fill = self.ctx.executor.execute(&order).await?;

        {
            let mut stats = self.stats();
            stats.sell_count += 1;
            stats.sell_volume += fill.amount_in;
            stats.sell_proceeds += fill.amount_out;
            stats.refresh_derived();
        }
        self.lifecycle.record_success();

        self.ctx.trade_log(
            LogLevel::Success,
            format!(
                "SELL {} {} -> {} {} @ {} ({})",
                fill.amount_in,
                self.ctx.base_symbol(),
                fill.amount_out,
                self.ctx.quote_symbol(),
                price,
                fill.tx_ref
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn config() -> ThresholdConfig {
        ThresholdConfig {
            buy_threshold: dec("0.08"),
            sell_threshold: dec("0.15"),
            trade_amount: Decimal::ONE,
            check_interval_secs: 30,
            slippage_pct: None,
        }
    }

    #[test]
    fn test_decide() {
        let config = config();
        assert_eq!(decide(dec("0.07"), &config), Signal::Buy);
        assert_eq!(decide(dec("0.08"), &config), Signal::Buy);
        assert_eq!(decide(dec("0.10"), &config), Signal::Hold);
        assert_eq!(decide(dec("0.15"), &config), Signal::Sell);
        assert_eq!(decide(dec("0.16"), &config), Signal::Sell);
    }

    #[test]
    fn test_buy_wins_when_thresholds_overlap() {
        let mut config = config();
        config.buy_threshold = dec("0.20");
        assert_eq!(decide(dec("0.16"), &config), Signal::Buy);
    }

    #[test]
    fn test_derived_stats() {
        let mut stats = ThresholdStats {
            buy_count: 2,
            buy_volume: Decimal::from(2),
            base_bought: Decimal::from(25),
            sell_count: 1,
            sell_volume: Decimal::from(10),
            sell_proceeds: dec("1.5"),
            ..Default::default()
        };
        stats.refresh_derived();
        assert_eq!(stats.avg_buy_price, Some(dec("0.08")));
        assert_eq!(stats.avg_sell_price, Some(dec("0.15")));
        assert_eq!(stats.net_pnl, dec("-0.5"));
    }
}
