// Technical indicator calculations
pub mod macd;
pub mod rsi;

pub use macd::{calculate_ema, calculate_macd};
pub use rsi::calculate_rsi;
