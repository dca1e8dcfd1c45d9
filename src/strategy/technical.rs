use super::SignalRule;
use crate::indicators::{calculate_macd, calculate_rsi};
use crate::models::{Candle, Signal, TickClass};

/// RSI + MACD rule
///
/// Long when the market is oversold (RSI < 30) with the MACD line above its
/// signal line; short when overbought (RSI > 70) with the MACD line below.
/// Indicators are evaluated over closed candles only, so the in-progress
/// bucket never contributes; checked once per new candle.
#[derive(Debug, Clone)]
pub struct TechnicalRule {
    rsi_length: usize,
    ema_fast: usize,
    ema_slow: usize,
    ema_signal: usize,
}

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

impl TechnicalRule {
    pub fn new(rsi_length: usize, ema_fast: usize, ema_slow: usize, ema_signal: usize) -> Self {
        Self {
            rsi_length,
            ema_fast,
            ema_slow,
            ema_signal,
        }
    }
}

impl SignalRule for TechnicalRule {
    fn name(&self) -> &'static str {
        "Technical"
    }

    fn triggers_on(&self, class: TickClass) -> bool {
        class == TickClass::NewCandle
    }

    fn min_candles(&self) -> usize {
        // One extra for the excluded in-progress candle, one for the first
        // price change feeding the indicators
        self.rsi_length.max(self.ema_slow) + 2
    }

    fn check_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles() {
            return Signal::None;
        }

        // Drop the in-progress bucket
        let closes: Vec<f64> = candles[..candles.len() - 1]
            .iter()
            .map(|c| c.close)
            .collect();

        let Some(rsi) = calculate_rsi(&closes, self.rsi_length) else {
            return Signal::None;
        };
        let Some((macd_line, signal_line)) =
            calculate_macd(&closes, self.ema_fast, self.ema_slow, self.ema_signal)
        else {
            return Signal::None;
        };

        tracing::debug!(
            rsi = rsi,
            macd_line = macd_line,
            signal_line = signal_line,
            "technical indicators"
        );

        if rsi < RSI_OVERSOLD && macd_line > signal_line {
            Signal::Long
        } else if rsi > RSI_OVERBOUGHT && macd_line < signal_line {
            Signal::Short
        } else {
            Signal::None
        }
    }
}
