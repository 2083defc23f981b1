pub mod rest;

pub use common::DEFAULT_DATA_URL;
pub use rest::AlpacaClient;
