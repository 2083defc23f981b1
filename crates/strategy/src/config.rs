use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::MovingAverageCrossover;

/// Top-level bot config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// name = "AAPL 10/30"
/// symbol = "AAPL"
/// timeframe = "1Hour"
/// short_window = 10
/// long_window = 30
/// trade_amount = 1000.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Human-readable name shown in logs.
    pub name: String,
    /// Ticker, e.g. "AAPL".
    pub symbol: String,
    /// Bar timeframe passed to the market-data API.
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    pub short_window: usize,
    pub long_window: usize,
    /// Cash to spend on a buy, in account currency.
    pub trade_amount: f64,
}

fn default_timeframe() -> String {
    "1Hour".to_string()
}

impl StrategyConfig {
    /// Validated crossover for this entry.
    pub fn crossover(&self) -> Result<MovingAverageCrossover> {
        self.validate()?;
        Ok(MovingAverageCrossover::new(
            self.short_window,
            self.long_window,
            self.trade_amount,
        ))
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config(format!("strategy '{}' has no symbol", self.name)));
        }
        if self.short_window == 0 || self.short_window >= self.long_window {
            return Err(Error::Config(format!(
                "strategy '{}': need 0 < short_window < long_window, got {} and {}",
                self.name, self.short_window, self.long_window
            )));
        }
        if !(self.trade_amount.is_finite() && self.trade_amount > 0.0) {
            return Err(Error::Config(format!(
                "strategy '{}': trade_amount must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

impl StrategyFileConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("invalid strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        for strategy in &cfg.strategies {
            strategy.validate()?;
        }
        Ok(cfg)
    }
}
