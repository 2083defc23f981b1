use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use common::{BrokerClient, OrderRequest, OrderSide, Result};
use strategy::{Decision, SkipReason, StrategyConfig};

/// Extra bars requested beyond the long window.
const BAR_SLACK: usize = 5;

/// Runs moving-average crossover strategies against a broker handle.
///
/// This is the only component that calls `BrokerClient::submit_order`.
pub struct CrossoverBot {
    client: Arc<dyn BrokerClient>,
    strategies: Vec<StrategyConfig>,
}

impl CrossoverBot {
    pub fn new(client: Arc<dyn BrokerClient>, strategies: Vec<StrategyConfig>) -> Self {
        Self { client, strategies }
    }

    pub fn strategies(&self) -> &[StrategyConfig] {
        &self.strategies
    }

    /// Evaluate one strategy and place an order if it calls for one.
    ///
    /// Invalid strategy entries and client failures are logged and returned.
    pub async fn tick(&self, cfg: &StrategyConfig) -> Result<Decision> {
        self.evaluate(cfg).await.inspect_err(|e| {
            error!(strategy = %cfg.name, symbol = %cfg.symbol, error = %e, "Bot tick failed");
        })
    }

    async fn evaluate(&self, cfg: &StrategyConfig) -> Result<Decision> {
        let crossover = cfg.crossover()?;
        let bars = self
            .client
            .bars(&cfg.symbol, &cfg.timeframe, cfg.long_window + BAR_SLACK)
            .await?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let Some((short_ma, long_ma)) = crossover.averages(&closes) else {
            info!(
                symbol = %cfg.symbol,
                bars = closes.len(),
                long_window = cfg.long_window,
                "Not enough data for long SMA, skipping"
            );
            return Ok(Decision::Skip(SkipReason::InsufficientData));
        };

        let held = self.client.position_qty(&cfg.symbol).await?;
        info!(
            symbol = %cfg.symbol,
            short_ma,
            long_ma,
            held,
            "Evaluated crossover"
        );

        let decision = crossover.decide(&closes, held);
        let order = match decision {
            Decision::Buy(qty) => OrderRequest::market(&cfg.symbol, OrderSide::Buy, qty),
            Decision::Sell(qty) => OrderRequest::market(&cfg.symbol, OrderSide::Sell, qty),
            Decision::Hold => {
                info!(symbol = %cfg.symbol, "No actionable crossover, holding");
                return Ok(decision);
            }
            Decision::Skip(reason) => {
                info!(symbol = %cfg.symbol, %reason, "Skipping");
                return Ok(decision);
            }
        };

        info!(symbol = %order.symbol, side = %order.side, qty = order.qty, "Placing order");
        let ack = self.client.submit_order(&order).await?;
        info!(order_id = %ack.id, status = %ack.status, "Order accepted");
        Ok(decision)
    }

    /// Tick every strategy on a fixed interval. Call from `tokio::spawn`.
    pub async fn run(self, every: Duration) {
        if self.strategies.is_empty() {
            warn!("No strategies configured, bot is idle");
            return;
        }
        info!(strategies = self.strategies.len(), ?every, "CrossoverBot running");

        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            for cfg in &self.strategies {
                // Failures are logged by `tick`; the next strategy still runs.
                let _ = self.tick(cfg).await;
            }
        }
    }
}
