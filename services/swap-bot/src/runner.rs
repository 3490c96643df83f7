//! Strategy Runner - process-wide registry of active strategies
//!
//! The runner owns every live strategy instance independently of whoever
//! started it. Each registered strategy gets a stats task that snapshots its
//! status into the store on a fixed cadence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{Result, StrategyError};
use crate::logs::{LogLevel, LogSink};
use crate::store::{keys, Persistence};
use crate::strategy::{Strategy, StrategyStatus};

static GLOBAL: OnceLock<Arc<StrategyRunner>> = OnceLock::new();

struct RunnerEntry {
    strategy: Strategy,
    stats_timer: Option<JoinHandle<()>>,
}

pub struct StrategyRunner {
    entries: Mutex<HashMap<String, RunnerEntry>>,
    logs: LogSink,
    store: Persistence,
    stats_interval: Duration,
}

impl StrategyRunner {
    pub fn new(logs: LogSink, store: Persistence, stats_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            logs,
            store,
            stats_interval,
        })
    }

    /// Install the process-wide runner; later calls return the first one
    pub fn init_global(runner: Arc<Self>) -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| runner))
    }

    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RunnerEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an instance under `id`, replacing any previous one
    pub fn register(&self, id: &str, strategy: Strategy) {
        let kind = strategy.kind();
        let previous = self.entries().insert(
            id.to_string(),
            RunnerEntry {
                strategy,
                stats_timer: None,
            },
        );

        if let Some(previous) = previous {
            // Caller should have stopped it; make sure nothing keeps ticking
            previous.strategy.stop("replaced");
            if let Some(timer) = previous.stats_timer {
                timer.abort();
            }
            self.logs.system(
                LogLevel::Warning,
                Some(id),
                format!("Strategy {} re-registered, previous instance discarded", kind),
            );
        } else {
            self.logs
                .system(LogLevel::Info, Some(id), format!("Registered {} strategy", kind));
        }
    }

    /// Start a registered strategy without waiting for its first trade
    pub fn start(&self, id: &str) -> Result<()> {
        let strategy = self
            .entries()
            .get(id)
            .map(|entry| entry.strategy.clone())
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;

        if let Err(e) = strategy.start() {
            self.logs
                .system(LogLevel::Error, Some(id), format!("Failed to start strategy: {}", e));
            return Err(e);
        }

        let timer = self.spawn_stats_timer(id, strategy.clone());
        let mut entries = self.entries();
        match entries.get_mut(id) {
            Some(entry) => {
                if let Some(old) = entry.stats_timer.replace(timer) {
                    old.abort();
                }
            }
            // Stopped while we were starting
            None => timer.abort(),
        }
        drop(entries);

        self.logs
            .system(LogLevel::Success, Some(id), format!("{} strategy started", strategy.kind()));
        Ok(())
    }

    /// Stop and unregister; a no-op for unknown ids
    pub async fn stop(&self, id: &str, reason: &str) {
        let entry = match self.entries().remove(id) {
            Some(entry) => entry,
            None => {
                debug!("Stop requested for unregistered strategy {}", id);
                return;
            }
        };

        entry.strategy.stop(reason);
        if let Some(timer) = entry.stats_timer {
            timer.abort();
        }

        let status = entry.strategy.status();
        self.store.save(&keys::bot_stats(id), &status).await;
        self.logs.persist(&self.store).await;
        info!(bot_id = id, "Strategy unregistered ({})", reason);
    }

    /// Registered, self-reported running, and still holding a live timer
    pub fn is_running(&self, id: &str) -> bool {
        self.entries()
            .get(id)
            .map(|entry| entry.strategy.is_running() && entry.strategy.has_active_timer())
            .unwrap_or(false)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn status(&self, id: &str) -> Option<StrategyStatus> {
        let strategy = self.entries().get(id).map(|entry| entry.strategy.clone())?;
        Some(strategy.status())
    }

    pub fn strategy(&self, id: &str) -> Option<Strategy> {
        self.entries().get(id).map(|entry| entry.strategy.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Stop everything; only for process teardown
    pub async fn cleanup_all(&self, reason: &str) {
        let ids = self.ids();
        if ids.is_empty() {
            return;
        }
        info!("Stopping {} strategies ({})", ids.len(), reason);
        for id in ids {
            self.stop(&id, reason).await;
        }
    }

    fn spawn_stats_timer(&self, id: &str, strategy: Strategy) -> JoinHandle<()> {
        let id = id.to_string();
        let store = self.store.clone();
        let logs = self.logs.clone();
        let period = self.stats_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick is immediate; the strategy has not traded yet
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let status = strategy.status();
                store.save(&keys::bot_stats(&id), &status).await;
                logs.persist(&store).await;

                if !status.is_running {
                    debug!(bot_id = %id, "Strategy no longer running, stats timer exiting");
                    break;
                }
            }
        })
    }
}
