use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{Error, Result, TradingMode};

const DEFAULT_ENV_FILE: &str = ".env";
/// Market-data host used when `API_DATA_URL` is unset.
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

/// Reads named configuration values from the process environment, after
/// optionally merging a local `NAME=value` file into it.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Targets the file named by `ENV_FILE`, or `.env` in the working directory.
    pub fn new() -> Self {
        let path = std::env::var("ENV_FILE").unwrap_or_else(|_| DEFAULT_ENV_FILE.to_string());
        Self::with_path(path)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the env file into the process environment.
    ///
    /// Variables that are already set are never overridden, so calling this
    /// again is a no-op. A missing file is not an error.
    pub fn load(&self) -> Result<()> {
        match dotenvy::from_path(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Loaded env file");
                Ok(())
            }
            Err(e) if e.not_found() => {
                debug!(path = %self.path.display(), "No env file present");
                Ok(())
            }
            Err(e) => Err(Error::Config(format!(
                "failed to load env file '{}': {e}",
                self.path.display()
            ))),
        }
    }

    /// Value of `name`, or `None` when unset. No validation happens here.
    pub fn get(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(name).ok()
    }

    /// Like [`get`](Self::get) but yields an empty string for unset names.
    pub fn get_or_empty(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }
}

/// Environment variable names for the three broker values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNames {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl Default for KeyNames {
    fn default() -> Self {
        Self {
            api_key: "API_KEY".to_string(),
            api_secret: "API_SECRET".to_string(),
            base_url: "API_BASE_URL".to_string(),
        }
    }
}

/// What to do when one of the broker values is missing or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPolicy {
    /// Forward missing values as empty strings and let the client decide.
    #[default]
    Permissive,
    /// Fail with `Error::Config` naming the first missing variable.
    Strict,
}

/// The three values a broker client is built from.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    /// Market-data host for bars and news.
    pub data_url: String,
}

// Keep secrets out of logs.
impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("base_url", &self.base_url)
            .field("data_url", &self.data_url)
            .finish()
    }
}

impl BrokerConfig {
    pub fn from_loader(
        loader: &ConfigLoader,
        keys: &KeyNames,
        policy: CredentialPolicy,
    ) -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            let value = loader.get_or_empty(name);
            if value.is_empty() {
                match policy {
                    CredentialPolicy::Strict => {
                        return Err(Error::Config(format!(
                            "required environment variable '{name}' is not set"
                        )))
                    }
                    CredentialPolicy::Permissive => {
                        warn!(var = name, "Broker setting is not set, forwarding empty value")
                    }
                }
            }
            Ok(value)
        };

        Ok(Self {
            api_key: read(&keys.api_key)?,
            api_secret: read(&keys.api_secret)?,
            base_url: read(&keys.base_url)?,
            data_url: loader
                .get("API_DATA_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_DATA_URL.to_string()),
        })
    }
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub trading_mode: TradingMode,
    pub policy: CredentialPolicy,

    // Paper trading
    pub paper_cash: f64,
    pub paper_slippage_bps: f64,

    // Bot
    pub strategy_config_path: String,
    pub bot_interval_secs: u64,
}

impl Config {
    /// Merge the env file (errors are logged, not fatal) and read all settings.
    pub fn load(loader: &ConfigLoader) -> Result<Self> {
        if let Err(e) = loader.load() {
            warn!(error = %e, "Continuing with process environment only");
        }

        let trading_mode = match loader.get("TRADING_MODE").filter(|v| !v.trim().is_empty()) {
            Some(v) => v.parse::<TradingMode>().map_err(Error::Config)?,
            None => TradingMode::default(),
        };

        let policy = if loader.get("STRICT_CREDENTIALS").is_some_and(|v| parse_flag(&v)) {
            CredentialPolicy::Strict
        } else {
            CredentialPolicy::Permissive
        };

        let broker = BrokerConfig::from_loader(loader, &KeyNames::default(), policy)?;
        info!(mode = %trading_mode, base_url = %broker.base_url, "Configuration loaded");

        Ok(Config {
            broker,
            trading_mode,
            policy,
            paper_cash: loader
                .get("PAPER_CASH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            paper_slippage_bps: loader
                .get("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            strategy_config_path: loader
                .get("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            bot_interval_secs: loader
                .get("BOT_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|&secs| secs > 0)
                .unwrap_or(3600),
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
