use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use super::{OrderRequest, StreamEvent, TransportError, VenueApi};
use crate::execution::{round_to_lot, round_to_tick, size_from_balance};
use crate::models::{
    Balance, Candle, Contract, ContractKind, OrderSide, OrderStatus, OrderType, Quote, Timeframe,
    Venue,
};

const MAINNET_REST: &str = "https://www.bitmex.com";
const MAINNET_WS: &str = "wss://www.bitmex.com/realtime";
const TESTNET_REST: &str = "https://testnet.bitmex.com";
const TESTNET_WS: &str = "wss://testnet.bitmex.com/realtime";

/// Venue lookback ceiling for one bucketed-trades request
const BUCKETED_COUNT: u32 = 500;
const RATE_LIMIT_RPS: u32 = 5;

/// Margin balances and contract multipliers are reported in satoshis
const SATOSHIS_PER_XBT: f64 = 100_000_000.0;

type HmacSha256 = Hmac<Sha256>;
type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// BitMEX client
///
/// Requests are signed with an HMAC-SHA256 hex digest of
/// `method + path + expires` (path including the query string), sent in the
/// `api-signature` header next to `api-key` and `api-expires`.
pub struct Bitmex {
    client: Client,
    base_url: String,
    ws_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<DirectLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentData {
    symbol: String,
    #[serde(default)]
    quote_currency: String,
    tick_size: f64,
    lot_size: f64,
    #[serde(default)]
    multiplier: i64,
    #[serde(default)]
    is_inverse: bool,
    #[serde(default)]
    is_quanto: bool,
    #[serde(default)]
    bid_price: Option<f64>,
    #[serde(default)]
    ask_price: Option<f64>,
}

impl InstrumentData {
    fn into_contract(self) -> Contract {
        let kind = if self.is_inverse {
            ContractKind::Inverse
        } else if self.is_quanto {
            ContractKind::Quanto
        } else {
            ContractKind::Linear
        };

        Contract {
            price_decimals: decimals_from_tick(self.tick_size),
            symbol: self.symbol,
            venue: Venue::Bitmex,
            quote_currency: self.quote_currency,
            tick_size: self.tick_size,
            lot_size: self.lot_size,
            kind,
            multiplier: self.multiplier.unsigned_abs() as f64 / SATOSHIS_PER_XBT,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginData {
    currency: String,
    #[serde(default)]
    wallet_balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketData {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderData {
    #[serde(rename = "orderID")]
    order_id: String,
    ord_status: String,
    #[serde(default)]
    avg_px: Option<f64>,
    #[serde(default)]
    cum_qty: Option<f64>,
}

impl OrderData {
    fn into_status(self) -> OrderStatus {
        OrderStatus {
            order_id: self.order_id,
            status: self.ord_status.to_lowercase(),
            avg_price: self.avg_px.unwrap_or(0.0),
            executed_qty: self.cum_qty.unwrap_or(0.0),
        }
    }
}

/// Number of decimal places implied by a tick size
fn decimals_from_tick(tick_size: f64) -> u32 {
    let mut value = tick_size;
    let mut decimals = 0;
    while value.fract().abs() > 1e-9 && decimals < 8 {
        value *= 10.0;
        decimals += 1;
    }
    decimals
}

fn parse_iso_millis(ts: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

// ============== Implementation ==============

impl Bitmex {
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Self {
        let (base_url, ws_url) = if testnet {
            (TESTNET_REST, TESTNET_WS)
        } else {
            (MAINNET_REST, MAINNET_WS)
        };

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap());

        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            ws_url: ws_url.to_string(),
            api_key,
            api_secret,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, api_secret: &str, base_url: String) -> Self {
        let mut client = Self::new(api_key.to_string(), api_secret.to_string(), false);
        client.base_url = base_url;
        client
    }

    fn sign(&self, method: &str, path: &str, expires: i64) -> String {
        let message = format!("{}{}{}", method, path, expires);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<T, TransportError> {
        self.rate_limiter.until_ready().await;

        let query = serde_urlencoded::to_string(&params)?;
        let path = if query.is_empty() {
            endpoint.to_string()
        } else {
            format!("{}?{}", endpoint, query)
        };

        let expires = Utc::now().timestamp() + 5;
        let signature = self.sign(method.as_str(), &path, expires);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .request(method, &url)
            .header("api-key", &self.api_key)
            .header("api-expires", expires.to_string())
            .header("api-signature", signature)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// REST dispatch with soft-failure semantics: errors are logged here
    /// and surfaced to the caller as `None`
    async fn dispatch<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> Option<T> {
        let method_name = method.to_string();
        match self.request(method, endpoint, params).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(
                    "error while making {} request to {}: {}",
                    method_name,
                    endpoint,
                    e
                );
                None
            }
        }
    }
}

#[async_trait]
impl VenueApi for Bitmex {
    fn venue(&self) -> Venue {
        Venue::Bitmex
    }

    async fn fetch_contracts(&self) -> Option<BTreeMap<String, Contract>> {
        let instruments: Vec<InstrumentData> = self
            .dispatch(Method::GET, "/api/v1/instrument/active", Vec::new())
            .await?;

        Some(
            instruments
                .into_iter()
                .map(|i| {
                    let contract = i.into_contract();
                    (contract.symbol.clone(), contract)
                })
                .collect(),
        )
    }

    async fn fetch_balances(&self) -> Option<HashMap<String, Balance>> {
        let params = vec![("currency", "all".to_string())];
        let margins: Vec<MarginData> = self
            .dispatch(Method::GET, "/api/v1/user/margin", params)
            .await?;

        Some(
            margins
                .into_iter()
                .map(|m| {
                    let balance = Balance {
                        asset: m.currency.clone(),
                        wallet_balance: m.wallet_balance as f64 / SATOSHIS_PER_XBT,
                    };
                    (m.currency, balance)
                })
                .collect(),
        )
    }

    async fn fetch_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> Option<Vec<Candle>> {
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("binSize", timeframe.as_str().to_string()),
            ("partial", "true".to_string()),
            ("count", BUCKETED_COUNT.to_string()),
            ("reverse", "true".to_string()),
        ];

        let buckets: Vec<BucketData> = self
            .dispatch(Method::GET, "/api/v1/trade/bucketed", params)
            .await?;

        let candles = buckets
            .into_iter()
            .rev()
            .filter_map(|b| {
                // Some buckets come back with missing data
                Some(Candle {
                    ts: parse_iso_millis(&b.timestamp)?,
                    open: b.open?,
                    high: b.high?,
                    low: b.low?,
                    close: b.close?,
                    volume: b.volume.unwrap_or(0.0),
                    timeframe,
                })
            })
            .collect();

        Some(candles)
    }

    async fn fetch_book_ticker(&self, contract: &Contract) -> Option<Quote> {
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("count", "1".to_string()),
        ];
        let instruments: Vec<InstrumentData> = self
            .dispatch(Method::GET, "/api/v1/instrument", params)
            .await?;

        let instrument = instruments.into_iter().next()?;
        Some(Quote {
            bid: instrument.bid_price,
            ask: instrument.ask_price,
        })
    }

    async fn place_order(
        &self,
        contract: &Contract,
        request: &OrderRequest,
    ) -> Option<OrderStatus> {
        let side = match request.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let order_type = match request.order_type {
            OrderType::Market => "Market",
            OrderType::Limit => "Limit",
        };
        let quantity = round_to_lot(request.quantity, contract.lot_size);

        let mut params = vec![
            ("symbol", contract.symbol.clone()),
            ("side", side.to_string()),
            ("orderQty", quantity.to_string()),
            ("ordType", order_type.to_string()),
        ];

        if let Some(price) = request.price {
            params.push(("price", round_to_tick(price, contract.tick_size).to_string()));
        }
        if let Some(tif) = &request.time_in_force {
            params.push(("timeInForce", tif.clone()));
        }

        let data: OrderData = self.dispatch(Method::POST, "/api/v1/order", params).await?;
        Some(data.into_status())
    }

    async fn cancel_order(&self, _contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let params = vec![("orderID", order_id.to_string())];
        let mut data: Vec<OrderData> = self
            .dispatch(Method::DELETE, "/api/v1/order", params)
            .await?;

        if data.is_empty() {
            return None;
        }
        Some(data.remove(0).into_status())
    }

    async fn order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        // The venue has no single-order endpoint; filter the recent list
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("reverse", "true".to_string()),
        ];
        let orders: Vec<OrderData> = self.dispatch(Method::GET, "/api/v1/order", params).await?;

        orders
            .into_iter()
            .find(|o| o.order_id == order_id)
            .map(|o| o.into_status())
    }

    async fn trade_size(
        &self,
        contract: &Contract,
        price: f64,
        balance_pct: f64,
    ) -> Option<f64> {
        let balances = self.fetch_balances().await?;

        let Some(balance) = balances.get("XBt") else {
            tracing::warn!(
                "no XBt margin balance on bitmex, cannot size order for {}",
                contract.symbol
            );
            return None;
        };

        let xbt_size = size_from_balance(balance.wallet_balance, balance_pct, 1.0);

        let contracts_number = match contract.kind {
            ContractKind::Inverse => xbt_size / (contract.multiplier / price),
            ContractKind::Quanto | ContractKind::Linear => {
                xbt_size / (contract.multiplier * price)
            }
        };

        let size = round_to_lot(contracts_number.floor(), contract.lot_size);

        tracing::info!(
            "bitmex XBT balance = {}, contracts number = {}",
            balance.wallet_balance,
            size
        );

        Some(size)
    }

    fn ws_url(&self) -> String {
        self.ws_url.clone()
    }

    fn subscribe_frame(&self, channel: &str, symbols: &[String], _frame_id: u64) -> String {
        let args: Vec<String> = if symbols.is_empty() {
            vec![channel.to_string()]
        } else {
            symbols
                .iter()
                .map(|s| format!("{}:{}", channel, s))
                .collect()
        };

        serde_json::json!({
            "op": "subscribe",
            "args": args,
        })
        .to_string()
    }

    fn default_subscriptions(&self) -> Vec<(String, Vec<String>)> {
        // Global topics: every symbol streams over the same subscriptions
        vec![
            ("instrument".to_string(), Vec::new()),
            ("trade".to_string(), Vec::new()),
        ]
    }

    fn market_channels(&self, _symbol: &str) -> Vec<(String, Vec<String>)> {
        // Covered by the global default subscriptions
        Vec::new()
    }

    fn parse_message(&self, text: &str) -> Vec<StreamEvent> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return Vec::new();
        };

        let Some(table) = value.get("table").and_then(|t| t.as_str()) else {
            return Vec::new();
        };
        let Some(rows) = value.get("data").and_then(|d| d.as_array()) else {
            return Vec::new();
        };

        let mut events = Vec::new();

        match table {
            "instrument" => {
                for row in rows {
                    let Some(symbol) = row.get("symbol").and_then(|s| s.as_str()) else {
                        continue;
                    };
                    let bid = row.get("bidPrice").and_then(|p| p.as_f64());
                    let ask = row.get("askPrice").and_then(|p| p.as_f64());
                    if bid.is_none() && ask.is_none() {
                        continue;
                    }
                    events.push(StreamEvent::Quote {
                        symbol: symbol.to_string(),
                        bid,
                        ask,
                    });
                }
            }
            "trade" => {
                for row in rows {
                    let Some(symbol) = row.get("symbol").and_then(|s| s.as_str()) else {
                        continue;
                    };
                    let (Some(price), Some(size), Some(ts)) = (
                        row.get("price").and_then(|p| p.as_f64()),
                        row.get("size").and_then(|s| s.as_f64()),
                        row.get("timestamp")
                            .and_then(|t| t.as_str())
                            .and_then(parse_iso_millis),
                    ) else {
                        continue;
                    };
                    events.push(StreamEvent::TradeTick {
                        symbol: symbol.to_string(),
                        price,
                        size,
                        ts,
                    });
                }
            }
            _ => {}
        }

        events
    }
}
