//! Bot Manager - creates, configures and starts bots on top of the runner

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chain::{ChainClient, SignerHandle, TradePair};
use crate::config::{ExecutionConfig, StrategyConfig};
use crate::error::{Result, StrategyError};
use crate::executor::{SwapOrder, TradeExecutor};
use crate::logs::{LogLevel, LogSink};
use crate::runner::StrategyRunner;
use crate::store::{keys, Persistence, TradeJournal};
use crate::strategy::{Strategy, StrategyContext, StrategyStats, StrategyStatus};
use crate::types::{Bot, Fill, TradeRecord, TradeType};

pub struct BotManager {
    bots: Mutex<Vec<Bot>>,
    runner: Arc<StrategyRunner>,
    store: Persistence,
    journal: TradeJournal,
    logs: LogSink,
    chain: Arc<dyn ChainClient>,
    signer: SignerHandle,
    execution: ExecutionConfig,
}

impl BotManager {
    pub fn new(
        runner: Arc<StrategyRunner>,
        store: Persistence,
        journal: TradeJournal,
        logs: LogSink,
        chain: Arc<dyn ChainClient>,
        signer: SignerHandle,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            bots: Mutex::new(Vec::new()),
            runner,
            store,
            journal,
            logs,
            chain,
            signer,
            execution,
        }
    }

    /// Load persisted bots; returns how many were found
    pub async fn load(&self) -> usize {
        let stored: Vec<Bot> = self.store.load(keys::BOTS, Vec::new()).await;
        let count = stored.len();
        *self.bots.lock().await = stored;
        info!("Loaded {} bots from store", count);
        count
    }

    pub fn runner(&self) -> &Arc<StrategyRunner> {
        &self.runner
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    async fn persist(&self, bots: &[Bot]) {
        self.store.save(keys::BOTS, bots).await;
    }

    pub async fn create_bot(
        &self,
        name: &str,
        config: StrategyConfig,
        base_token: &str,
        quote_token: &str,
    ) -> Result<Bot> {
        config.validate()?;
        resolve_pair(base_token, quote_token)?;

        let bot = Bot::new(name, config, base_token, quote_token);
        let mut bots = self.bots.lock().await;
        bots.push(bot.clone());
        self.persist(&bots).await;
        drop(bots);

        self.logs.system(
            LogLevel::Info,
            Some(&bot.id),
            format!("Created {} bot \"{}\" on {}/{}", bot.strategy_kind, name, base_token, quote_token),
        );
        Ok(bot)
    }

    pub async fn get_bot(&self, id: &str) -> Option<Bot> {
        self.bots.lock().await.iter().find(|b| b.id == id).cloned()
    }

    /// Replace a stopped bot's config; previous progress is discarded
    pub async fn update_config(&self, id: &str, config: StrategyConfig) -> Result<Bot> {
        config.validate()?;

        let mut bots = self.bots.lock().await;
        let bot = bots
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;

        if self.runner.is_running(id) {
            return Err(StrategyError::Running(id.to_string()));
        }

        bot.running = false;
        bot.strategy_kind = config.kind();
        bot.config = config;
        bot.stats = None;
        let updated = bot.clone();
        self.persist(&bots).await;
        drop(bots);

        self.store.remove(&keys::bot_stats(id)).await;
        self.logs
            .system(LogLevel::Info, Some(id), format!("Updated config of \"{}\"", updated.name));
        Ok(updated)
    }

    pub async fn delete_bot(&self, id: &str) -> Result<()> {
        self.runner.stop(id, "deleted").await;

        let mut bots = self.bots.lock().await;
        let before = bots.len();
        bots.retain(|b| b.id != id);
        if bots.len() == before {
            return Err(StrategyError::NotFound(id.to_string()));
        }
        self.persist(&bots).await;
        drop(bots);

        self.store.remove(&keys::bot_stats(id)).await;
        self.logs.system(LogLevel::Info, Some(id), "Bot deleted");
        Ok(())
    }

    /// Build the strategy, register it and start it
    ///
    /// The running flag is persisted before the strategy starts and put
    /// back if starting fails.
    pub async fn start_bot(&self, id: &str) -> Result<()> {
        let bot = self
            .get_bot(id)
            .await
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;

        if self.runner.is_running(id) {
            return Err(StrategyError::AlreadyRunning(id.to_string()));
        }

        // Clear out a finished instance left behind by a self-stop
        self.runner.stop(id, "restart").await;

        let strategy = self.build_strategy(&bot).await?;
        self.set_running(id, true).await;
        self.runner.register(id, strategy);

        if let Err(e) = self.runner.start(id) {
            self.runner.stop(id, "start failed").await;
            self.set_running(id, false).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn stop_bot(&self, id: &str) -> Result<()> {
        if self.get_bot(id).await.is_none() {
            return Err(StrategyError::NotFound(id.to_string()));
        }
        self.runner.stop(id, "stopped by user").await;
        self.set_running(id, false).await;
        Ok(())
    }

    /// Bots with running flags and stats refreshed from the runner
    pub async fn list_bots(&self) -> Vec<Bot> {
        let mut bots = self.bots.lock().await;
        let mut changed = false;
        let mut finished = Vec::new();

        for bot in bots.iter_mut() {
            let live = self.runner.is_running(&bot.id);
            if bot.running && !live {
                bot.running = false;
                changed = true;
                if self.runner.is_registered(&bot.id) {
                    finished.push(bot.id.clone());
                }
            }

            bot.stats = match self.runner.status(&bot.id) {
                Some(status) => Some(status.stats),
                None => self
                    .store
                    .load::<Option<StrategyStatus>>(&keys::bot_stats(&bot.id), None)
                    .await
                    .map(|status| status.stats),
            };
        }

        if changed {
            self.persist(&bots).await;
        }
        let snapshot = bots.clone();
        drop(bots);

        for id in finished {
            self.runner.stop(&id, "completed").await;
        }
        snapshot
    }

    /// Restart every bot that was running when the process last exited
    pub async fn resume_running(&self) -> usize {
        let ids: Vec<String> = self
            .bots
            .lock()
            .await
            .iter()
            .filter(|b| b.running)
            .map(|b| b.id.clone())
            .collect();

        let mut resumed = 0;
        for id in ids {
            match self.start_bot(&id).await {
                Ok(()) => resumed += 1,
                Err(e) => warn!(bot_id = %id, "Could not resume bot: {}", e),
            }
        }
        resumed
    }

    /// One-off swap outside any strategy, journaled with source `manual`
    pub async fn manual_swap(
        &self,
        trade_type: TradeType,
        amount_in: Decimal,
        base_token: &str,
        quote_token: &str,
    ) -> Result<Fill> {
        if amount_in <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig("swap amount must be positive".to_string()));
        }

        let pair = resolve_pair(base_token, quote_token)?;
        let executor = TradeExecutor::new(
            Arc::clone(&self.chain),
            self.signer.clone(),
            pair,
            self.journal.clone(),
            self.execution.slippage_pct,
        );

        let price = executor.fetch_price().await?;
        let order = match trade_type {
            TradeType::Buy => SwapOrder::buy(amount_in, price),
            TradeType::Sell => SwapOrder::sell(amount_in, price),
        }
        .manual();

        match executor.execute(&order).await {
            Ok(fill) => {
                self.logs.trade(
                    LogLevel::Success,
                    None,
                    format!(
                        "Manual {} {} {} -> {} {} @ {}",
                        trade_type,
                        fill.amount_in,
                        if trade_type == TradeType::Buy { quote_token } else { base_token },
                        fill.amount_out,
                        if trade_type == TradeType::Buy { base_token } else { quote_token },
                        price
                    ),
                );
                Ok(fill)
            }
            Err(e) => {
                let level = if e.is_insufficient_funds() { LogLevel::Warning } else { LogLevel::Error };
                self.logs
                    .trade(level, None, format!("Manual {} failed: {}", trade_type, e));
                Err(e.into())
            }
        }
    }

    /// Most recent trades, newest first
    pub async fn trade_history(&self, limit: usize) -> Vec<TradeRecord> {
        self.journal.recent(limit).await
    }

    async fn set_running(&self, id: &str, running: bool) {
        let mut bots = self.bots.lock().await;
        if let Some(bot) = bots.iter_mut().find(|b| b.id == id) {
            bot.running = running;
        }
        self.persist(&bots).await;
    }

    async fn build_strategy(&self, bot: &Bot) -> Result<Strategy> {
        let pair = resolve_pair(&bot.base_token, &bot.quote_token)?;
        let slippage = bot
            .config
            .slippage_pct()
            .unwrap_or(self.execution.slippage_pct);
        let executor = TradeExecutor::new(
            Arc::clone(&self.chain),
            self.signer.clone(),
            pair,
            self.journal.clone(),
            slippage,
        );
        let ctx = StrategyContext::new(&bot.id, &bot.name, executor, self.logs.clone());

        let strategy = Strategy::from_config(ctx, &bot.config)?;
        let strategy = match strategy {
            Strategy::Dca(dca) => {
                let persisted: Option<StrategyStatus> =
                    self.store.load(&keys::bot_stats(&bot.id), None).await;
                match persisted.map(|s| s.stats) {
                    Some(StrategyStats::Dca(stats)) => {
                        info!(
                            bot_id = %bot.id,
                            "Restoring DCA progress: {} buys, {} spent",
                            stats.executed_times, stats.total_spent
                        );
                        Strategy::Dca(dca.with_progress(&stats))
                    }
                    _ => Strategy::Dca(dca),
                }
            }
            other => other,
        };
        Ok(strategy)
    }
}

fn resolve_pair(base: &str, quote: &str) -> Result<TradePair> {
    TradePair::resolve(base, quote).map_err(|e| StrategyError::InvalidConfig(e.to_string()))
}
