use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{BrokerClient, ClientFactory, Config, ConfigLoader, Result, TradingMode};
use engine::{connect, AlpacaFactory, CrossoverBot};
use paper::PaperFactory;
use strategy::StrategyFileConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let loader = ConfigLoader::new();
    let cfg = Config::load(&loader)?;
    info!(mode = %cfg.trading_mode, env_file = %loader.path().display(), "brokerbot starting");

    // ── Broker client (injected based on TRADING_MODE) ────────────────────────
    let live = AlpacaFactory::with_data_url(&cfg.broker.data_url);
    let factory: Box<dyn ClientFactory> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, orders go to the broker");
            Box::new(live)
        }
        TradingMode::Paper => {
            info!(
                cash = cfg.paper_cash,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode, orders are simulated"
            );
            Box::new(
                PaperFactory::new(cfg.paper_cash, cfg.paper_slippage_bps)
                    .with_market_factory(live),
            )
        }
    };
    let client = connect(factory.as_ref(), &cfg.broker)?;
    log_account(client.as_ref()).await;

    // ── Bot ───────────────────────────────────────────────────────────────────
    let strategies = StrategyFileConfig::load(&cfg.strategy_config_path)?.strategies;
    for s in &strategies {
        info!(name = %s.name, symbol = %s.symbol, short = s.short_window, long = s.long_window, "Registered strategy");
    }
    let bot = CrossoverBot::new(Arc::clone(&client), strategies);
    let every = Duration::from_secs(cfg.bot_interval_secs);

    tokio::select! {
        _ = bot.run(every) => warn!("Bot stopped"),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutdown signal received. Exiting.");
        }
    }
    Ok(())
}

/// Best-effort startup snapshot; failures are logged and do not stop the bot.
async fn log_account(client: &dyn BrokerClient) {
    match client.account().await {
        Ok(a) => info!(cash = a.cash, buying_power = a.buying_power, equity = a.equity, "Account"),
        Err(e) => warn!(error = %e, "Could not fetch account"),
    }
    match client.positions().await {
        Ok(p) => info!(open_positions = p.len(), "Positions"),
        Err(e) => warn!(error = %e, "Could not fetch positions"),
    }
    match client.open_orders().await {
        Ok(o) => info!(open_orders = o.len(), "Orders"),
        Err(e) => warn!(error = %e, "Could not fetch open orders"),
    }
}
