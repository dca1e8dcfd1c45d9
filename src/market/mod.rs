// Live market data handling
pub mod candles;

pub use candles::CandleSeries;
