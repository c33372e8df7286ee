use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StrategyConfig;
use crate::error::HedgeError;
use crate::execution::{Exchange, Interval};
use crate::models::{Candle, OrderResult, PositionInfo, PositionSide};

const MAINNET_BASE: &str = "https://fapi.binance.com";
const TESTNET_BASE: &str = "https://testnet.binancefuture.com";
const RATE_LIMIT_RPM: u32 = 600;
const MAX_RETRIES: u32 = 3;
const RECV_WINDOW_MS: u64 = 5000;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    executed_qty: Decimal,
    avg_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_side: String,
    position_amt: Decimal,
    entry_price: Decimal,
    un_realized_profit: Decimal,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance USD-M futures REST client (hedge-mode positions)
///
/// Cloneable; clones share the rate limiter and the lot-size cache.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    /// symbol -> LOT_SIZE step
    step_sizes: Arc<RwLock<HashMap<String, Decimal>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, use_testnet: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));
        let base_url = if use_testnet { TESTNET_BASE } else { MAINNET_BASE };

        tracing::info!("Initialized Binance futures client ({})", base_url);

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            step_sizes: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        Self::new(&config.api_key, &config.api_secret, config.use_testnet)
    }

    /// Point the client at another host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Hex HMAC-SHA256 of the query string
    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid API secret: {}", e))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_request(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<RequestBuilder> {
        let mut query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            chrono::Utc::now().timestamp_millis()
        ));
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        Ok(self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key))
    }

    /// Rate-limited send, retrying 429/5xx and network errors with backoff
    ///
    /// `build` is called per attempt so signed requests get a fresh timestamp.
    async fn make_request<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match build()?.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Binance returned {}, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    anyhow::bail!("Binance API error ({}): {}", status, error_message(response).await);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    pub async fn fetch_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);
        let response = self
            .make_request(|| Ok(self.client.get(&url).query(&[("symbol", symbol)])))
            .await?;

        let ticker: TickerPrice = response.json().await.context("Failed to parse ticker price")?;
        Ok(ticker.price)
    }

    pub async fn fetch_klines(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let url = format!("{}/fapi/v1/klines", self.base_url);
        let limit = limit.to_string();
        let response = self
            .make_request(|| {
                Ok(self.client.get(&url).query(&[
                    ("symbol", symbol),
                    ("interval", interval.as_str()),
                    ("limit", limit.as_str()),
                ]))
            })
            .await?;

        let rows: Vec<Vec<serde_json::Value>> =
            response.json().await.context("Failed to parse klines")?;

        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Fetched {} {} candles for {}", candles.len(), interval, symbol);
        Ok(candles)
    }

    /// LOT_SIZE step for a symbol, loading exchangeInfo on first use
    async fn step_size(&self, symbol: &str) -> Result<Decimal> {
        if let Some(step) = self.step_sizes.read().await.get(symbol) {
            return Ok(*step);
        }

        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let response = self.make_request(|| Ok(self.client.get(&url))).await?;
        let info: ExchangeInfo = response.json().await.context("Failed to parse exchange info")?;

        let mut cache = self.step_sizes.write().await;
        for entry in info.symbols {
            if let Some(step) = lot_step(&entry.filters) {
                cache.insert(entry.symbol, step);
            }
        }
        tracing::info!("Loaded lot sizes for {} symbols", cache.len());

        cache
            .get(symbol)
            .copied()
            .with_context(|| format!("No LOT_SIZE filter for {}", symbol))
    }

    /// Quote-currency notional converted to a lot-aligned base quantity
    async fn quantity_for_notional(&self, symbol: &str, notional: Decimal) -> Result<Decimal> {
        let price = self.fetch_price(symbol).await?;
        if price <= Decimal::ZERO {
            anyhow::bail!("Invalid price {} for {}", price, symbol);
        }
        let step = self.step_size(symbol).await?;
        let quantity = round_to_step(notional / price, step);
        if quantity <= Decimal::ZERO {
            anyhow::bail!(
                "Notional {} too small for {} at price {} (step {})",
                notional,
                symbol,
                price,
                step
            );
        }
        Ok(quantity)
    }

    /// Signed MARKET order; not retried so a timeout can't double-fill
    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        position_side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderResult> {
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
            ("positionSide", position_side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        self.rate_limiter.until_ready().await;
        let response = self
            .signed_request(Method::POST, "/fapi/v1/order", &params)?
            .send()
            .await
            .context("Order request failed")?;

        if !response.status().is_success() {
            return Ok(OrderResult::failed(error_message(response).await));
        }

        let order: OrderResponse = response.json().await.context("Failed to parse order response")?;
        tracing::info!(
            "Binance order {} {} {} {}: filled {} @ {}",
            order.order_id,
            side,
            position_side.as_str(),
            symbol,
            order.executed_qty,
            order.avg_price
        );
        Ok(OrderResult::filled(order.order_id.to_string(), order.executed_qty, order.avg_price))
    }

    async fn open(&self, symbol: &str, side: &str, position_side: PositionSide, notional: Decimal) -> OrderResult {
        let quantity = match self.quantity_for_notional(symbol, notional).await {
            Ok(quantity) => quantity,
            Err(e) => return OrderResult::failed(format!("{:#}", e)),
        };
        self.place_market_order(symbol, side, position_side, quantity)
            .await
            .unwrap_or_else(|e| OrderResult::failed(format!("{:#}", e)))
    }

    async fn close(&self, symbol: &str, side: &str, position_side: PositionSide, quantity: Decimal) -> OrderResult {
        self.place_market_order(symbol, side, position_side, quantity)
            .await
            .unwrap_or_else(|e| OrderResult::failed(format!("{:#}", e)))
    }

    pub async fn fetch_position(&self, symbol: &str, side: PositionSide) -> Result<PositionInfo> {
        let params = [("symbol", symbol.to_string())];
        let response = self
            .make_request(|| self.signed_request(Method::GET, "/fapi/v2/positionRisk", &params))
            .await?;

        let positions: Vec<PositionRisk> =
            response.json().await.context("Failed to parse position risk")?;

        let position = positions
            .into_iter()
            .find(|p| p.symbol == symbol && p.position_side.eq_ignore_ascii_case(side.as_str()));

        Ok(match position {
            Some(p) => PositionInfo {
                symbol: p.symbol,
                side,
                quantity: p.position_amt.abs(),
                entry_price: p.entry_price,
                unrealized_pnl: p.un_realized_profit,
            },
            None => PositionInfo {
                symbol: symbol.to_string(),
                side,
                quantity: Decimal::ZERO,
                entry_price: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
            },
        })
    }
}

fn to_hedge_error(e: anyhow::Error) -> HedgeError {
    HedgeError::Execution(format!("{:#}", e))
}

#[async_trait]
impl Exchange for BinanceFuturesClient {
    async fn get_last_price(&self, symbol: &str) -> crate::Result<Decimal> {
        self.fetch_price(symbol).await.map_err(to_hedge_error)
    }

    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> crate::Result<Vec<Candle>> {
        self.fetch_klines(symbol, interval, limit).await.map_err(to_hedge_error)
    }

    async fn open_long(&self, symbol: &str, notional: Decimal) -> OrderResult {
        self.open(symbol, "BUY", PositionSide::Long, notional).await
    }

    async fn close_long(&self, symbol: &str, quantity: Decimal) -> OrderResult {
        self.close(symbol, "SELL", PositionSide::Long, quantity).await
    }

    async fn open_short(&self, symbol: &str, notional: Decimal) -> OrderResult {
        self.open(symbol, "SELL", PositionSide::Short, notional).await
    }

    async fn close_short(&self, symbol: &str, quantity: Decimal) -> OrderResult {
        self.close(symbol, "BUY", PositionSide::Short, quantity).await
    }

    async fn get_position(&self, symbol: &str, side: PositionSide) -> crate::Result<PositionInfo> {
        self.fetch_position(symbol, side).await.map_err(to_hedge_error)
    }
}

/// `{"code":..,"msg":..}` body when present, raw text otherwise
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match serde_json::from_str::<ApiError>(&text) {
        Ok(err) => format!("{} (code {})", err.msg, err.code),
        Err(_) => format!("HTTP {}: {}", status, text),
    }
}

/// Kline row: [openTime, open, high, low, close, volume, closeTime, ...]
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    if row.len() < 6 {
        anyhow::bail!("Kline row has {} fields, expected at least 6", row.len());
    }

    let open_time_ms = row[0].as_i64().context("Kline open time is not an integer")?;
    let open_time = chrono::DateTime::from_timestamp_millis(open_time_ms)
        .with_context(|| format!("Kline open time out of range: {}", open_time_ms))?;

    let field = |index: usize| -> Result<Decimal> {
        let value = row[index]
            .as_str()
            .with_context(|| format!("Kline field {} is not a string", index))?;
        value
            .parse::<Decimal>()
            .with_context(|| format!("Kline field {} is not a decimal: {}", index, value))
    };

    Ok(Candle {
        open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

fn lot_step(filters: &[serde_json::Value]) -> Option<Decimal> {
    filters
        .iter()
        .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some("LOT_SIZE"))
        .and_then(|f| f.get("stepSize"))
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<Decimal>().ok())
        .filter(|step| *step > Decimal::ZERO)
}

/// Round down to a whole number of steps
fn round_to_step(quantity: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return quantity;
    }
    ((quantity / step).floor() * step).normalize()
}
