//! Swap Bot - runs trading strategies against a Uniswap-V2-style AMM
//!
//! 1. Loads configuration (swap-bot.toml + SWAP_BOT__* env vars)
//! 2. Restores bots, logs and trade history from the data directory
//! 3. Resumes every bot that was running at last shutdown
//! 4. Runs until Ctrl-C, then stops all strategies and flushes state

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use swap_bot::chain::{ChainClient, HttpChainClient, PaperChainClient, SignerHandle, TradePair};
use swap_bot::config::{AppConfig, ChainMode};
use swap_bot::logs::{LogLevel, LogSink};
use swap_bot::manager::BotManager;
use swap_bot::runner::StrategyRunner;
use swap_bot::store::{FileStore, Persistence, TradeJournal};

/// Swap bot entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    info!("Starting Swap Bot...");
    info!(
        "Mode: {:?}, wallet: {}, data dir: {}",
        config.chain_mode,
        config.wallet_address,
        config.data_dir().display()
    );

    let file_store = FileStore::new(config.data_dir());
    file_store.init().await?;
    let store = Persistence::new(Arc::new(file_store));

    let logs = LogSink::new(config.log_retention);
    logs.restore(&store).await;
    let journal = TradeJournal::new(store.clone(), config.trade_history_retention);

    let signer = SignerHandle::new(&config.wallet_address, "default");
    let chain = build_chain(&config, &signer)?;
    info!("Chain client: {}", chain.name());

    let runner = StrategyRunner::init_global(StrategyRunner::new(
        logs.clone(),
        store.clone(),
        config.stats_interval(),
    ));

    let manager = BotManager::new(
        Arc::clone(&runner),
        store.clone(),
        journal,
        logs.clone(),
        chain,
        signer,
        config.execution,
    );

    let total = manager.load().await;
    let resumed = manager.resume_running().await;
    logs.system(
        LogLevel::Info,
        None,
        format!("Swap bot ready: {} bots, {} resumed", total, resumed),
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping strategies...");

    runner.cleanup_all("shutdown").await;
    logs.persist(&store).await;
    info!("✓ Shutdown complete");
    Ok(())
}

fn build_chain(config: &AppConfig, signer: &SignerHandle) -> anyhow::Result<Arc<dyn ChainClient>> {
    match config.chain_mode {
        ChainMode::Paper => {
            let pair = TradePair::resolve(&config.base_token, &config.quote_token)?;
            let paper = PaperChainClient::new(pair.clone(), config.paper);
            paper.fund(signer, &pair.quote, config.paper.initial_quote_balance);
            paper.fund(signer, &pair.base, config.paper.initial_base_balance);
            Ok(Arc::new(paper))
        }
        ChainMode::Live => {
            let client = HttpChainClient::new(
                &config.gateway_url,
                &config.rpc_url,
                &config.router_address,
                config.execution,
            )?;
            Ok(Arc::new(client))
        }
    }
}
