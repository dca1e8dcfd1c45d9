use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
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

const MAINNET_REST: &str = "https://fapi.binance.com";
const MAINNET_WS: &str = "wss://fstream.binance.com/ws";
const TESTNET_REST: &str = "https://testnet.binancefuture.com";
const TESTNET_WS: &str = "wss://stream.binancefuture.com/ws";

/// Venue lookback ceiling for one klines request
const KLINES_LIMIT: u32 = 1000;
const RATE_LIMIT_RPS: u32 = 8;

type HmacSha256 = Hmac<Sha256>;
type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance USD-M Futures client
///
/// Signed endpoints carry an HMAC-SHA256 hex digest of the url-encoded
/// query string as the `signature` parameter, plus the API key in the
/// `X-MBX-APIKEY` header.
pub struct BinanceFutures {
    client: Client,
    base_url: String,
    ws_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<DirectLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ExchangeInfoData {
    symbols: Vec<SymbolData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolData {
    symbol: String,
    quote_asset: String,
    price_precision: u32,
    quantity_precision: u32,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    assets: Vec<AssetData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetData {
    asset: String,
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTickerData {
    bid_price: String,
    ask_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderData {
    order_id: i64,
    status: String,
    #[serde(default)]
    avg_price: Option<String>,
    executed_qty: String,
}

impl OrderData {
    fn into_status(self) -> OrderStatus {
        OrderStatus {
            order_id: self.order_id.to_string(),
            status: self.status.to_lowercase(),
            avg_price: self
                .avg_price
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            executed_qty: self.executed_qty.parse().unwrap_or(0.0),
        }
    }
}

// ============== Implementation ==============

impl BinanceFutures {
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

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        mut params: Vec<(&'static str, String)>,
        signed: bool,
    ) -> Result<T, TransportError> {
        self.rate_limiter.until_ready().await;

        if signed {
            params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        }

        let mut query = serde_urlencoded::to_string(&params)?;
        if signed {
            let signature = self.sign(&query);
            query.push_str("&signature=");
            query.push_str(&signature);
        }

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
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
        signed: bool,
    ) -> Option<T> {
        let method_name = method.to_string();
        match self.request(method, endpoint, params, signed).await {
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

    fn parse_kline(row: &[serde_json::Value], timeframe: Timeframe) -> Option<Candle> {
        Some(Candle {
            ts: row.first()?.as_i64()?,
            open: row.get(1)?.as_str()?.parse().ok()?,
            high: row.get(2)?.as_str()?.parse().ok()?,
            low: row.get(3)?.as_str()?.parse().ok()?,
            close: row.get(4)?.as_str()?.parse().ok()?,
            volume: row.get(5)?.as_str()?.parse().ok()?,
            timeframe,
        })
    }

    fn str_price(value: &serde_json::Value, key: &str) -> Option<f64> {
        value.get(key)?.as_str()?.parse().ok()
    }
}

#[async_trait]
impl VenueApi for BinanceFutures {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    async fn fetch_contracts(&self) -> Option<BTreeMap<String, Contract>> {
        let info: ExchangeInfoData = self
            .dispatch(Method::GET, "/fapi/v1/exchangeInfo", Vec::new(), false)
            .await?;

        let contracts = info
            .symbols
            .into_iter()
            .map(|s| {
                let contract = Contract {
                    symbol: s.symbol.clone(),
                    venue: Venue::BinanceFutures,
                    quote_currency: s.quote_asset,
                    tick_size: 10f64.powi(-(s.price_precision as i32)),
                    lot_size: 10f64.powi(-(s.quantity_precision as i32)),
                    price_decimals: s.price_precision,
                    kind: ContractKind::Linear,
                    multiplier: 1.0,
                };
                (s.symbol, contract)
            })
            .collect();

        Some(contracts)
    }

    async fn fetch_balances(&self) -> Option<HashMap<String, Balance>> {
        let account: AccountData = self
            .dispatch(Method::GET, "/fapi/v1/account", Vec::new(), true)
            .await?;

        let balances = account
            .assets
            .into_iter()
            .map(|a| {
                let balance = Balance {
                    asset: a.asset.clone(),
                    wallet_balance: a.wallet_balance.parse().unwrap_or(0.0),
                };
                (a.asset, balance)
            })
            .collect();

        Some(balances)
    }

    async fn fetch_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> Option<Vec<Candle>> {
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", KLINES_LIMIT.to_string()),
        ];

        let rows: Vec<Vec<serde_json::Value>> = self
            .dispatch(Method::GET, "/fapi/v1/klines", params, false)
            .await?;

        Some(
            rows.iter()
                .filter_map(|row| Self::parse_kline(row, timeframe))
                .collect(),
        )
    }

    async fn fetch_book_ticker(&self, contract: &Contract) -> Option<Quote> {
        let params = vec![("symbol", contract.symbol.clone())];
        let data: BookTickerData = self
            .dispatch(Method::GET, "/fapi/v1/ticker/bookTicker", params, false)
            .await?;

        Some(Quote {
            bid: data.bid_price.parse().ok(),
            ask: data.ask_price.parse().ok(),
        })
    }

    async fn place_order(
        &self,
        contract: &Contract,
        request: &OrderRequest,
    ) -> Option<OrderStatus> {
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };
        let quantity = round_to_lot(request.quantity, contract.lot_size);

        let mut params = vec![
            ("symbol", contract.symbol.clone()),
            ("side", side.to_string()),
            ("quantity", quantity.to_string()),
            ("type", order_type.to_string()),
        ];

        if let Some(price) = request.price {
            let price = round_to_tick(price, contract.tick_size);
            params.push((
                "price",
                format!("{:.*}", contract.price_decimals as usize, price),
            ));
        }
        if let Some(tif) = &request.time_in_force {
            params.push(("timeInForce", tif.clone()));
        }

        let data: OrderData = self
            .dispatch(Method::POST, "/fapi/v1/order", params, true)
            .await?;
        Some(data.into_status())
    }

    async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("orderId", order_id.to_string()),
        ];
        let data: OrderData = self
            .dispatch(Method::DELETE, "/fapi/v1/order", params, true)
            .await?;
        Some(data.into_status())
    }

    async fn order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let params = vec![
            ("symbol", contract.symbol.clone()),
            ("orderId", order_id.to_string()),
        ];
        let data: OrderData = self
            .dispatch(Method::GET, "/fapi/v1/order", params, true)
            .await?;
        Some(data.into_status())
    }

    async fn trade_size(
        &self,
        contract: &Contract,
        price: f64,
        balance_pct: f64,
    ) -> Option<f64> {
        let balances = self.fetch_balances().await?;

        let Some(balance) = balances.get(&contract.quote_currency) else {
            tracing::warn!(
                "no {} balance on binance_futures, cannot size order for {}",
                contract.quote_currency,
                contract.symbol
            );
            return None;
        };

        let size = round_to_lot(
            size_from_balance(balance.wallet_balance, balance_pct, price),
            contract.lot_size,
        );

        tracing::info!(
            "binance_futures {} balance = {}, trade size = {}",
            contract.quote_currency,
            balance.wallet_balance,
            size
        );

        Some(size)
    }

    fn ws_url(&self) -> String {
        self.ws_url.clone()
    }

    fn subscribe_frame(&self, channel: &str, symbols: &[String], frame_id: u64) -> String {
        let params: Vec<String> = if symbols.is_empty() {
            vec![channel.to_string()]
        } else {
            symbols
                .iter()
                .map(|s| format!("{}@{}", s.to_lowercase(), channel))
                .collect()
        };

        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": frame_id,
        })
        .to_string()
    }

    fn default_subscriptions(&self) -> Vec<(String, Vec<String>)> {
        vec![("bookTicker".to_string(), vec!["BTCUSDT".to_string()])]
    }

    fn market_channels(&self, symbol: &str) -> Vec<(String, Vec<String>)> {
        vec![
            ("bookTicker".to_string(), vec![symbol.to_string()]),
            ("aggTrade".to_string(), vec![symbol.to_string()]),
        ]
    }

    fn parse_message(&self, text: &str) -> Vec<StreamEvent> {
        let Ok(mut value) = serde_json::from_str::<serde_json::Value>(text) else {
            return Vec::new();
        };

        // Raw book-ticker frames arrive without an event type
        if value.get("u").is_some() && value.get("A").is_some() && value.get("e").is_none() {
            value["e"] = serde_json::Value::String("bookTicker".to_string());
        }

        match value.get("e").and_then(|e| e.as_str()) {
            Some("bookTicker") => {
                let Some(symbol) = value.get("s").and_then(|s| s.as_str()) else {
                    return Vec::new();
                };
                vec![StreamEvent::Quote {
                    symbol: symbol.to_string(),
                    bid: Self::str_price(&value, "b"),
                    ask: Self::str_price(&value, "a"),
                }]
            }
            Some("aggTrade") => {
                let Some(symbol) = value.get("s").and_then(|s| s.as_str()) else {
                    return Vec::new();
                };
                let (Some(price), Some(size), Some(ts)) = (
                    Self::str_price(&value, "p"),
                    Self::str_price(&value, "q"),
                    value.get("T").and_then(|t| t.as_i64()),
                ) else {
                    return Vec::new();
                };
                vec![StreamEvent::TradeTick {
                    symbol: symbol.to_string(),
                    price,
                    size,
                    ts,
                }]
            }
            _ => Vec::new(),
        }
    }
}
