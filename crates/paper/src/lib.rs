use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Account, Bar, BrokerClient, ClientFactory, Error, NewsItem, OrderAck, OrderRequest, OrderSide,
    OrderType, Position, Result,
};

pub const PAPER_BASE_URL: &str = "paper://local";

/// Simulated broker client for paper trading and tests.
///
/// Market orders fill immediately at the latest known price with configurable
/// slippage; limit orders fill at their limit price. No order ever leaves the
/// process. Bars and news come from an attached live client when one is set,
/// otherwise from locally seeded history.
pub struct PaperClient {
    base_url: String,
    cash: RwLock<f64>,
    /// Open simulated positions, keyed by symbol.
    positions: RwLock<HashMap<String, Position>>,
    /// Latest known price per symbol.
    prices: RwLock<HashMap<String, f64>>,
    /// Seeded bars per symbol, oldest first.
    history: RwLock<HashMap<String, Vec<Bar>>>,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
    market: Option<Arc<dyn BrokerClient>>,
}

impl PaperClient {
    pub fn new(initial_cash: f64, slippage_bps: f64) -> Self {
        info!(cash = initial_cash, slippage_bps, "PaperClient initialized");
        Self {
            base_url: PAPER_BASE_URL.to_string(),
            cash: RwLock::new(initial_cash),
            positions: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            slippage_bps,
            market: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Read bars and news from a live client; orders stay simulated.
    pub fn with_market_data(mut self, market: Arc<dyn BrokerClient>) -> Self {
        self.market = Some(market);
        self
    }

    /// Update the latest price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Append hourly bars built from `closes` and move the latest price to the last one.
    pub async fn seed_closes(&self, symbol: &str, closes: &[f64]) {
        let Some(&last) = closes.last() else {
            return;
        };
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        let bars = closes.iter().enumerate().map(|(i, &c)| Bar {
            timestamp: start + Duration::hours(i as i64),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: 0.0,
        });
        self.history
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .extend(bars);
        self.update_price(symbol, last).await;
    }

    fn fill_price(&self, order: &OrderRequest, mid: f64) -> f64 {
        match (order.order_type, order.limit_price) {
            (OrderType::Limit, Some(limit)) => limit,
            _ => match order.side {
                OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
                OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
            },
        }
    }
}

#[async_trait]
impl BrokerClient for PaperClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn account(&self) -> Result<Account> {
        let cash = *self.cash.read().await;
        let prices = self.prices.read().await;
        let holdings: f64 = self
            .positions
            .read()
            .await
            .values()
            .map(|p| p.qty * prices.get(&p.symbol).copied().unwrap_or(p.avg_entry_price))
            .sum();
        Ok(Account {
            cash,
            buying_power: cash,
            equity: cash + holdings,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let prices = self.prices.read().await;
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .map(|p| Position {
                market_value: p.qty * prices.get(&p.symbol).copied().unwrap_or(p.avg_entry_price),
                ..p.clone()
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn position_qty(&self, symbol: &str) -> Result<f64> {
        Ok(self
            .positions
            .read()
            .await
            .get(symbol)
            .map(|p| p.qty)
            .unwrap_or(0.0))
    }

    async fn open_orders(&self) -> Result<Vec<OrderAck>> {
        // Paper fills are immediate, nothing stays open.
        Ok(Vec::new())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        if !(order.qty.is_finite() && order.qty > 0.0) {
            return Err(Error::Broker(format!("qty must be positive, got {}", order.qty)));
        }

        let mid = self
            .prices
            .read()
            .await
            .get(&order.symbol)
            .copied()
            .ok_or_else(|| {
                Error::Broker(format!("PaperClient has no price for '{}'", order.symbol))
            })?;
        let fill_price = self.fill_price(order, mid);
        let notional = fill_price * order.qty;

        let mut cash = self.cash.write().await;
        let mut positions = self.positions.write().await;
        match order.side {
            OrderSide::Buy => {
                if notional > *cash {
                    return Err(Error::Broker(format!(
                        "insufficient buying power: need {notional:.2}, have {:.2}",
                        *cash
                    )));
                }
                *cash -= notional;
                let pos = positions.entry(order.symbol.clone()).or_insert(Position {
                    symbol: order.symbol.clone(),
                    qty: 0.0,
                    avg_entry_price: 0.0,
                    market_value: 0.0,
                });
                let total = pos.qty + order.qty;
                pos.avg_entry_price = (pos.avg_entry_price * pos.qty + notional) / total;
                pos.qty = total;
            }
            OrderSide::Sell => {
                let held = positions.get(&order.symbol).map(|p| p.qty).unwrap_or(0.0);
                if order.qty > held {
                    return Err(Error::Broker(format!(
                        "insufficient qty for {}: requested {}, held {held}",
                        order.symbol, order.qty
                    )));
                }
                *cash += notional;
                if order.qty == held {
                    positions.remove(&order.symbol);
                } else if let Some(pos) = positions.get_mut(&order.symbol) {
                    pos.qty -= order.qty;
                }
            }
        }

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid,
            fill = fill_price,
            qty = order.qty,
            "Paper fill simulated"
        );

        Ok(OrderAck {
            id: uuid::Uuid::new_v4().to_string(),
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            qty: order.qty,
            status: "filled".to_string(),
            filled_avg_price: Some(fill_price),
            submitted_at: Utc::now(),
        })
    }

    async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        if let Some(market) = &self.market {
            let bars = market.bars(symbol, timeframe, limit).await?;
            if let Some(last) = bars.last() {
                self.update_price(symbol, last.close).await;
            }
            return Ok(bars);
        }

        let history = self.history.read().await;
        let bars = history.get(symbol).map(Vec::as_slice).unwrap_or_default();
        Ok(bars[bars.len().saturating_sub(limit)..].to_vec())
    }

    async fn news(&self, limit: usize) -> Result<Vec<NewsItem>> {
        match &self.market {
            Some(market) => market.news(limit).await,
            None => Ok(Vec::new()),
        }
    }
}

/// The three values a factory was called with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

/// Builds [`PaperClient`] handles and records every call.
pub struct PaperFactory {
    initial_cash: f64,
    slippage_bps: f64,
    market: Option<Box<dyn ClientFactory>>,
    calls: Mutex<Vec<Credentials>>,
}

impl PaperFactory {
    pub fn new(initial_cash: f64, slippage_bps: f64) -> Self {
        Self {
            initial_cash,
            slippage_bps,
            market: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Also build a live client with the same credentials for market data.
    pub fn with_market_factory(mut self, market: impl ClientFactory + 'static) -> Self {
        self.market = Some(Box::new(market));
        self
    }

    /// Every `create_client` call so far, oldest first.
    pub fn calls(&self) -> Vec<Credentials> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl ClientFactory for PaperFactory {
    fn create_client(
        &self,
        api_key: &str,
        api_secret: &str,
        base_url: &str,
    ) -> Result<Arc<dyn BrokerClient>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Credentials {
                api_key: api_key.to_string(),
                api_secret: api_secret.to_string(),
                base_url: base_url.to_string(),
            });
        }

        let mut client =
            PaperClient::new(self.initial_cash, self.slippage_bps).with_base_url(base_url);
        if let Some(market) = &self.market {
            client = client.with_market_data(market.create_client(api_key, api_secret, base_url)?);
        }
        Ok(Arc::new(client))
    }
}
