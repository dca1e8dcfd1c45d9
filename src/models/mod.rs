use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A derivatives venue we can trade on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    BinanceFutures,
    Bitmex,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::BinanceFutures => "binance_futures",
            Venue::Bitmex => "bitmex",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "binance" | "binance_futures" => Some(Self::BinanceFutures),
            "bitmex" => Some(Self::Bitmex),
            _ => None,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract settlement math variant
///
/// Linear and quanto contracts settle `(price - entry) * multiplier * qty`,
/// inverse contracts settle in the base asset and use the reciprocal form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Linear,
    Inverse,
    Quanto,
}

/// A tradable instrument as reported by the venue's catalog
///
/// Immutable after a catalog refresh; looked up by symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub venue: Venue,
    pub quote_currency: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub price_decimals: u32,
    pub kind: ContractKind,
    pub multiplier: f64,
}

impl Contract {
    /// Running PnL for an open trade at the given mark price
    pub fn pnl(&self, side: Side, entry_price: f64, price: f64, quantity: f64) -> f64 {
        match self.kind {
            ContractKind::Inverse => match side {
                Side::Long => (1.0 / entry_price - 1.0 / price) * self.multiplier * quantity,
                Side::Short => (1.0 / price - 1.0 / entry_price) * self.multiplier * quantity,
            },
            ContractKind::Linear | ContractKind::Quanto => match side {
                Side::Long => (price - entry_price) * self.multiplier * quantity,
                Side::Short => (entry_price - price) * self.multiplier * quantity,
            },
        }
    }
}

/// Account balance for a single asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub wallet_balance: f64,
}

/// Candle interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            _ => None,
        }
    }

    pub fn secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
        }
    }

    pub fn millis(&self) -> i64 {
        self.secs() * 1000
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLCV candlestick data
///
/// `ts` is the bucket-start timestamp in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
}

impl Candle {
    /// A flat candle filling a bucket no trade printed in
    pub fn flat(ts: i64, price: f64, timeframe: Timeframe) -> Self {
        Self {
            ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            timeframe,
        }
    }
}

/// Latest best bid/ask for an instrument
///
/// Venues may update only one side at a time, so both are optional and the
/// price cache merges partial updates.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Quote {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Directional recommendation produced by a strategy rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    None,
}

/// Position direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a position in this direction
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction
    pub fn exit_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A position opened by a strategy instance
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub id: Uuid,
    /// Open time in milliseconds
    pub time: i64,
    pub symbol: String,
    pub strategy: String,
    pub side: Side,
    pub status: TradeStatus,
    /// None until the entry order is confirmed filled
    pub entry_price: Option<f64>,
    pub quantity: f64,
    pub pnl: f64,
    pub entry_order_id: String,
}

/// Normalized result of an order placement or status poll
///
/// Ephemeral: only used to update the owning trade.
#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub order_id: String,
    /// Venue status lowercased ("new", "filled", ...)
    pub status: String,
    pub avg_price: f64,
    pub executed_qty: f64,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        self.status == "filled"
    }
}

/// How a trade tick related to the candle series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickClass {
    SameCandle,
    NewCandle,
}

/// A watched instrument row, persisted across restarts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub venue: Venue,
}
