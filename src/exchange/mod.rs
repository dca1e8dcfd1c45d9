// Venue connectivity
pub mod binance;
pub mod bitmex;
pub mod connector;
pub mod session;
pub mod subscriptions;

pub use connector::Connector;
pub use subscriptions::SubscriptionBook;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use crate::models::{
    Balance, Candle, Contract, OrderSide, OrderStatus, OrderType, Quote, Timeframe, Venue,
};

/// Request to place one order
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub time_in_force: Option<String>,
}

impl OrderRequest {
    pub fn market(side: OrderSide, quantity: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: None,
        }
    }

    pub fn limit(side: OrderSide, quantity: f64, price: f64, time_in_force: Option<String>) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            time_in_force,
        }
    }
}

/// Venue-agnostic event parsed from one inbound WebSocket frame
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Best bid/ask update; venues may send one side at a time
    Quote {
        symbol: String,
        bid: Option<f64>,
        ask: Option<f64>,
    },
    /// A single trade print
    TradeTick {
        symbol: String,
        price: f64,
        size: f64,
        /// Venue trade timestamp in milliseconds
        ts: i64,
    },
}

/// Transport-level failure raised inside a venue client before it is
/// degraded to the soft no-result value
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("venue rejected request: status {status}, body {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to encode request parameters: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
}

/// One venue's REST and WebSocket surface
///
/// All REST operations are soft-failing: venue rejections and transport
/// errors are logged at the failure site and surfaced as `None`, never as a
/// panic. Callers skip the action and carry on.
#[async_trait]
pub trait VenueApi: Send + Sync {
    fn venue(&self) -> Venue;

    /// Tradable instruments, keyed and sorted by symbol
    async fn fetch_contracts(&self) -> Option<BTreeMap<String, Contract>>;

    /// Account balances keyed by asset
    async fn fetch_balances(&self) -> Option<HashMap<String, Balance>>;

    /// Historical candles, oldest first, bounded to the venue's maximum
    /// lookback window
    async fn fetch_historical_candles(
        &self,
        contract: &Contract,
        timeframe: Timeframe,
    ) -> Option<Vec<Candle>>;

    /// REST snapshot of the best bid/ask
    async fn fetch_book_ticker(&self, contract: &Contract) -> Option<Quote>;

    async fn place_order(&self, contract: &Contract, request: &OrderRequest)
        -> Option<OrderStatus>;

    async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus>;

    async fn order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus>;

    /// Order quantity worth `balance_pct` percent of the relevant balance at
    /// the given reference price, in the venue's contract units
    async fn trade_size(
        &self,
        contract: &Contract,
        price: f64,
        balance_pct: f64,
    ) -> Option<f64>;

    // --- WebSocket surface ---

    fn ws_url(&self) -> String;

    /// Text frame subscribing the given instruments to a channel; an empty
    /// symbol list subscribes the channel globally
    fn subscribe_frame(&self, channel: &str, symbols: &[String], frame_id: u64) -> String;

    /// Market-data subscriptions every session must carry
    fn default_subscriptions(&self) -> Vec<(String, Vec<String>)>;

    /// Channels a strategy instance on `symbol` needs
    fn market_channels(&self, symbol: &str) -> Vec<(String, Vec<String>)>;

    /// Parse one inbound text frame into venue-agnostic events
    fn parse_message(&self, text: &str) -> Vec<StreamEvent>;
}
