use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{
    Account, Bar, BrokerClient, Error, NewsItem, OrderAck, OrderRequest, OrderSide, OrderType,
    Position, Result, TimeInForce, DEFAULT_DATA_URL,
};

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// REST API client for Alpaca. Used for account queries, orders and market data.
///
/// Construction does no I/O and performs no validation; bad credentials or a
/// malformed base URL surface on the first request.
pub struct AlpacaClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    data_url: String,
    http: Client,
}

impl AlpacaClient {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.into(),
            data_url: DEFAULT_DATA_URL.to_string(),
            http,
        })
    }

    /// Override the market-data host used for bars and news.
    pub fn with_data_url(mut self, data_url: impl Into<String>) -> Self {
        self.data_url = data_url.into();
        self
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    fn trading(&self, path: &str) -> String {
        join(&self.base_url, path)
    }

    fn market(&self, path: &str) -> String {
        join(&self.data_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(KEY_HEADER, &self.api_key)
            .header(SECRET_HEADER, &self.api_secret)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        self.authed(req)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(url = %url, "GET");
        let resp = self.send(self.http.get(url).query(query)).await?;
        let body = check(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BrokerClient for AlpacaClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn account(&self) -> Result<Account> {
        let raw: AccountResponse = self.get_json(&self.trading("/v2/account"), &[]).await?;
        Ok(Account {
            cash: num("cash", &raw.cash)?,
            buying_power: num("buying_power", &raw.buying_power)?,
            equity: num("equity", &raw.equity)?,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let raw: Vec<PositionResponse> = self.get_json(&self.trading("/v2/positions"), &[]).await?;
        raw.into_iter().map(PositionResponse::into_position).collect()
    }

    async fn position_qty(&self, symbol: &str) -> Result<f64> {
        let url = self.trading(&format!("/v2/positions/{symbol}"));
        debug!(url = %url, "GET");
        let resp = self.send(self.http.get(&url)).await?;

        // 404 is how the API says "no position"
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(0.0);
        }
        let body = check(resp).await?;
        let raw: PositionResponse = serde_json::from_str(&body)?;
        num("qty", &raw.qty)
    }

    async fn open_orders(&self) -> Result<Vec<OrderAck>> {
        let raw: Vec<OrderResponse> = self
            .get_json(&self.trading("/v2/orders"), &[("status", "open".to_string())])
            .await?;
        raw.into_iter().map(OrderResponse::into_ack).collect()
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let url = self.trading("/v2/orders");
        let body = NewOrderBody::from(order);
        debug!(symbol = %order.symbol, side = %order.side, qty = order.qty, "Submitting order to Alpaca");

        let resp = self.send(self.http.post(&url).json(&body)).await?;
        let text = check(resp).await?;
        let raw: OrderResponse = serde_json::from_str(&text)?;
        raw.into_ack()
    }

    async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let url = self.market(&format!("/v2/stocks/{symbol}/bars"));
        // Without `start` the API only looks at the current day. Ask for the
        // newest bars first so `limit` keeps the most recent ones.
        let mut query = vec![
            ("timeframe", timeframe.to_string()),
            ("limit", limit.to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(lookback) = lookback(timeframe, limit) {
            let start = Utc::now() - lookback;
            query.push(("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        let raw: BarsResponse = self.get_json(&url, &query).await?;

        Ok(raw
            .bars
            .unwrap_or_default()
            .into_iter()
            .rev()
            .map(|b| Bar {
                timestamp: b.t,
                open: b.o,
                high: b.h,
                low: b.l,
                close: b.c,
                volume: b.v,
            })
            .collect())
    }

    async fn news(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let raw: NewsResponse = self
            .get_json(&self.market("/v1beta1/news"), &[("limit", limit.to_string())])
            .await?;
        Ok(raw.news)
    }
}

/// Length of one bar for timeframes like `15Min`, `1Hour`, `1Day`, `1Week`, `1Month`.
fn timeframe_span(timeframe: &str) -> Option<Duration> {
    let split = timeframe.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = timeframe.split_at(split);
    let count: i64 = if count.is_empty() { 1 } else { count.parse().ok()? };
    let span = match unit {
        "Min" | "T" => Duration::minutes(count),
        "Hour" | "H" => Duration::hours(count),
        "Day" | "D" => Duration::days(count),
        "Week" | "W" => Duration::weeks(count),
        "Month" | "M" => Duration::days(31 * count),
        _ => return None,
    };
    Some(span)
}

/// How far back `start` goes so that `limit` bars exist despite nights,
/// weekends and holidays. `None` for timeframes we cannot parse.
fn lookback(timeframe: &str, limit: usize) -> Option<Duration> {
    let bars = i32::try_from(limit.min(10_000)).ok()?;
    let span = timeframe_span(timeframe)?;
    Some(span * bars.saturating_mul(3) + Duration::days(4))
}

fn join(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

async fn check(resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(Error::Broker(format!("HTTP {status}: {body}")));
    }
    Ok(body)
}

/// Alpaca encodes most decimals as JSON strings.
fn num(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Broker(format!("bad {field} '{value}': {e}")))
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct NewOrderBody<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    client_order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

impl<'a> From<&'a OrderRequest> for NewOrderBody<'a> {
    fn from(order: &'a OrderRequest) -> Self {
        Self {
            symbol: &order.symbol,
            qty: order.qty.to_string(),
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            client_order_id: &order.client_order_id,
            limit_price: order.limit_price.map(|p| p.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    cash: String,
    buying_power: String,
    equity: String,
}

#[derive(Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    #[serde(default)]
    market_value: Option<String>,
}

impl PositionResponse {
    fn into_position(self) -> Result<Position> {
        Ok(Position {
            qty: num("qty", &self.qty)?,
            avg_entry_price: num("avg_entry_price", &self.avg_entry_price)?,
            market_value: self
                .market_value
                .as_deref()
                .map(|v| num("market_value", v))
                .transpose()?
                .unwrap_or(0.0),
            symbol: self.symbol,
        })
    }
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    client_order_id: String,
    symbol: String,
    side: OrderSide,
    // null for notional orders
    qty: Option<String>,
    status: String,
    filled_avg_price: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl OrderResponse {
    fn into_ack(self) -> Result<OrderAck> {
        Ok(OrderAck {
            qty: self.qty.as_deref().map(|v| num("qty", v)).transpose()?.unwrap_or(0.0),
            filled_avg_price: self
                .filled_avg_price
                .as_deref()
                .map(|v| num("filled_avg_price", v))
                .transpose()?,
            id: self.id,
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            side: self.side,
            status: self.status,
            submitted_at: self.submitted_at,
        })
    }
}

#[derive(Deserialize)]
struct BarsResponse {
    bars: Option<Vec<RawBar>>,
}

#[derive(Deserialize)]
struct RawBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    news: Vec<NewsItem>,
}
