use std::sync::Arc;

use async_trait::async_trait;

use crate::{Account, Bar, NewsItem, OrderAck, OrderRequest, Position, Result};

/// Abstraction over the brokerage connection.
///
/// `AlpacaClient` implements this against the REST API.
/// `PaperClient` implements this for simulation and tests.
///
/// One handle is built at startup by a [`ClientFactory`] and shared as
/// `Arc<dyn BrokerClient>` with everything that talks to the broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Base URL the handle was constructed with.
    fn base_url(&self) -> &str;

    /// Cash, buying power and equity.
    async fn account(&self) -> Result<Account>;

    /// All open positions.
    async fn positions(&self) -> Result<Vec<Position>>;

    /// Quantity held for `symbol`. Returns `0.0` when there is no position.
    async fn position_qty(&self, symbol: &str) -> Result<f64>;

    /// Orders that are still open at the broker.
    async fn open_orders(&self) -> Result<Vec<OrderAck>>;

    /// Submit an order and return the broker's acknowledgement.
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Historical bars for `symbol`, oldest first.
    async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>>;

    /// Latest market news.
    async fn news(&self, limit: usize) -> Result<Vec<NewsItem>>;
}

/// Builds the process-wide client handle from the three configuration values.
///
/// Values are forwarded untouched; any validation is up to the implementation.
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        api_key: &str,
        api_secret: &str,
        base_url: &str,
    ) -> Result<Arc<dyn BrokerClient>>;
}
