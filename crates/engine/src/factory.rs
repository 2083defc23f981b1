use std::sync::Arc;

use tracing::info;

use common::{BrokerClient, BrokerConfig, ClientFactory, Result};

use crate::alpaca::AlpacaClient;

/// Builds [`AlpacaClient`] handles.
#[derive(Debug, Clone, Default)]
pub struct AlpacaFactory {
    data_url: Option<String>,
}

impl AlpacaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_url(data_url: impl Into<String>) -> Self {
        Self {
            data_url: Some(data_url.into()),
        }
    }
}

impl ClientFactory for AlpacaFactory {
    fn create_client(
        &self,
        api_key: &str,
        api_secret: &str,
        base_url: &str,
    ) -> Result<Arc<dyn BrokerClient>> {
        let mut client = AlpacaClient::new(api_key, api_secret, base_url)?;
        if let Some(data_url) = &self.data_url {
            client = client.with_data_url(data_url);
        }
        Ok(Arc::new(client))
    }
}

/// Build the one client handle for this process.
///
/// The handle is returned to the caller and passed on explicitly; nothing is
/// stored globally.
pub fn connect(factory: &dyn ClientFactory, cfg: &BrokerConfig) -> Result<Arc<dyn BrokerClient>> {
    let client = factory.create_client(&cfg.api_key, &cfg.api_secret, &cfg.base_url)?;
    info!(base_url = %client.base_url(), "Broker client ready");
    Ok(client)
}
