pub mod alpaca;
pub mod bot;
pub mod factory;

pub use alpaca::AlpacaClient;
pub use bot::CrossoverBot;
pub use factory::{connect, AlpacaFactory};
