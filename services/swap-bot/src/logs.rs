//! Log sink - capped system and trade event streams for display

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::store::{keys, Persistence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    /// Lifecycle: register, start, stop, completion
    System,
    /// Prices, trades and trade failures
    Trade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub bot_id: Option<String>,
    pub message: String,
}

struct Channels {
    system: VecDeque<LogEntry>,
    trade: VecDeque<LogEntry>,
}

impl Channels {
    fn get_mut(&mut self, channel: LogChannel) -> &mut VecDeque<LogEntry> {
        match channel {
            LogChannel::System => &mut self.system,
            LogChannel::Trade => &mut self.trade,
        }
    }

    fn get(&self, channel: LogChannel) -> &VecDeque<LogEntry> {
        match channel {
            LogChannel::System => &self.system,
            LogChannel::Trade => &self.trade,
        }
    }
}

/// Shared handle to both log channels
///
/// Every entry is mirrored to `tracing`; the oldest entry of a channel is
/// evicted once it holds `capacity` entries.
#[derive(Clone)]
pub struct LogSink {
    channels: Arc<Mutex<Channels>>,
    capacity: usize,
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: Arc::new(Mutex::new(Channels {
                system: VecDeque::with_capacity(capacity),
                trade: VecDeque::with_capacity(capacity),
            })),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, channel: LogChannel, level: LogLevel, bot_id: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        let bot = bot_id.unwrap_or("-");
        match level {
            LogLevel::Info | LogLevel::Success => info!(bot_id = bot, channel = ?channel, "{}", message),
            LogLevel::Warning => warn!(bot_id = bot, channel = ?channel, "{}", message),
            LogLevel::Error => error!(bot_id = bot, channel = ?channel, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            bot_id: bot_id.map(str::to_string),
            message,
        };

        let mut channels = self.lock();
        let queue = channels.get_mut(channel);
        while queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(entry);
    }

    pub fn system(&self, level: LogLevel, bot_id: Option<&str>, message: impl Into<String>) {
        self.append(LogChannel::System, level, bot_id, message);
    }

    pub fn trade(&self, level: LogLevel, bot_id: Option<&str>, message: impl Into<String>) {
        self.append(LogChannel::Trade, level, bot_id, message);
    }

    /// Snapshot of a channel, oldest first
    pub fn entries(&self, channel: LogChannel) -> Vec<LogEntry> {
        self.lock().get(channel).iter().cloned().collect()
    }

    /// Entries of a channel that belong to one bot
    pub fn entries_for(&self, channel: LogChannel, bot_id: &str) -> Vec<LogEntry> {
        self.lock()
            .get(channel)
            .iter()
            .filter(|e| e.bot_id.as_deref() == Some(bot_id))
            .cloned()
            .collect()
    }

    pub fn clear(&self, channel: LogChannel) {
        self.lock().get_mut(channel).clear();
    }

    pub async fn persist(&self, store: &Persistence) {
        let system = self.entries(LogChannel::System);
        let trade = self.entries(LogChannel::Trade);
        store.save(keys::LOGS_SYSTEM, &system).await;
        store.save(keys::LOGS_TRADE, &trade).await;
    }

    /// Load persisted entries in front of anything logged since startup
    pub async fn restore(&self, store: &Persistence) {
        let system: Vec<LogEntry> = store.load(keys::LOGS_SYSTEM, Vec::new()).await;
        let trade: Vec<LogEntry> = store.load(keys::LOGS_TRADE, Vec::new()).await;

        let mut channels = self.lock();
        for (channel, restored) in [(LogChannel::System, system), (LogChannel::Trade, trade)] {
            let queue = channels.get_mut(channel);
            let current: Vec<LogEntry> = queue.drain(..).collect();
            for entry in restored.into_iter().chain(current) {
                if queue.len() >= self.capacity {
                    queue.pop_front();
                }
                queue.push_back(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction_per_channel() {
        let sink = LogSink::new(3);
        for i in 0..5 {
            sink.trade(LogLevel::Info, Some("bot"), format!("trade {}", i));
        }
        sink.system(LogLevel::Info, None, "boot");

        let trades = sink.entries(LogChannel::Trade);
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].message, "trade 2");
        assert_eq!(trades[2].message, "trade 4");
        assert_eq!(sink.entries(LogChannel::System).len(), 1);
    }

    #[test]
    fn test_entries_for_bot() {
        let sink = LogSink::new(10);
        sink.trade(LogLevel::Info, Some("a"), "one");
        sink.trade(LogLevel::Warning, Some("b"), "two");
        assert_eq!(sink.entries_for(LogChannel::Trade, "b").len(), 1);
        sink.clear(LogChannel::Trade);
        assert!(sink.entries(LogChannel::Trade).is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let store = Persistence::in_memory();
        let sink = LogSink::new(2);
        sink.system(LogLevel::Success, Some("a"), "started");
        sink.persist(&store).await;

        let fresh = LogSink::new(2);
        fresh.system(LogLevel::Info, None, "boot");
        fresh.system(LogLevel::Info, None, "resume");
        fresh.restore(&store).await;

        let entries = fresh.entries(LogChannel::System);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "boot");
        assert_eq!(entries[1].message, "resume");
    }
}
