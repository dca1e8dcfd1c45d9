use super::SignalRule;
use crate::models::{Candle, Signal, TickClass};

/// Price/volume breakout rule
///
/// Long when the latest candle closes above the prior candle's high on
/// sufficient volume; short on the mirrored break below the prior low.
/// Checked on every tick so an intrabar break is acted on immediately.
#[derive(Debug, Clone)]
pub struct BreakoutRule {
    min_volume: f64,
}

impl BreakoutRule {
    pub fn new(min_volume: f64) -> Self {
        Self { min_volume }
    }
}

impl SignalRule for BreakoutRule {
    fn name(&self) -> &'static str {
        "Breakout"
    }

    fn triggers_on(&self, _class: TickClass) -> bool {
        true
    }

    fn min_candles(&self) -> usize {
        2
    }

    fn check_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < 2 {
            return Signal::None;
        }

        let last = &candles[candles.len() - 1];
        let prev = &candles[candles.len() - 2];

        if last.close > prev.high && last.volume > self.min_volume {
            Signal::Long
        } else if last.close < prev.low && last.volume > self.min_volume {
            Signal::Short
        } else {
            Signal::None
        }
    }
}
