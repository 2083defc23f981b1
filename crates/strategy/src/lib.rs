pub mod config;
pub mod crossover;
pub mod indicators;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use crossover::{Decision, MovingAverageCrossover, SkipReason};
