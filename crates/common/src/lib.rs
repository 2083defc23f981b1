pub mod broker;
pub mod config;
pub mod error;
pub mod types;

pub use broker::{BrokerClient, ClientFactory};
pub use config::{
    BrokerConfig, Config, ConfigLoader, CredentialPolicy, KeyNames, DEFAULT_DATA_URL,
};
pub use error::{Error, Result};
pub use types::*;
