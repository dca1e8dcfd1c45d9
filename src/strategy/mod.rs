// Trading strategy rules
pub mod breakout;
pub mod technical;

use serde::{Deserialize, Serialize};

use crate::models::{Candle, Signal, TickClass, Timeframe, Venue};

/// Entry-signal rule evaluated against the candle sequence
///
/// The two variants share the same instance lifecycle and trade state; only
/// the signal math and the tick classifications they react to differ.
pub trait SignalRule: Send + Sync {
    /// Rule name, used as the owning strategy label on trades
    fn name(&self) -> &'static str;

    /// Whether this rule should be evaluated for the given classification
    fn triggers_on(&self, class: TickClass) -> bool;

    /// Minimum candles required before a signal can be computed
    fn min_candles(&self) -> usize;

    /// Compute the signal over the candle sequence
    fn check_signal(&self, candles: &[Candle]) -> Signal;
}

/// Rule-specific parameters, serialized as a tagged blob so configurations
/// can persist without the store knowing rule internals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleParams {
    Technical {
        rsi_length: usize,
        ema_fast: usize,
        ema_slow: usize,
        ema_signal: usize,
    },
    Breakout {
        min_volume: f64,
    },
}

impl RuleParams {
    pub fn build(&self) -> Box<dyn SignalRule> {
        match *self {
            RuleParams::Technical {
                rsi_length,
                ema_fast,
                ema_slow,
                ema_signal,
            } => Box::new(technical::TechnicalRule::new(
                rsi_length, ema_fast, ema_slow, ema_signal,
            )),
            RuleParams::Breakout { min_volume } => {
                Box::new(breakout::BreakoutRule::new(min_volume))
            }
        }
    }
}

/// Activation parameters for one strategy instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub symbol: String,
    pub venue: Venue,
    pub timeframe: Timeframe,
    /// Percentage of the quote-asset balance to risk per entry
    pub balance_pct: f64,
    /// Take-profit threshold as a percentage offset from entry
    pub take_profit: Option<f64>,
    /// Stop-loss threshold as a percentage offset from entry
    pub stop_loss: Option<f64>,
    pub rule: RuleParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_params_serialize_as_tagged_blob() {
        let params = RuleParams::Breakout { min_volume: 25.0 };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"type\":\"breakout\""));

        let back: RuleParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_technical_params_roundtrip() {
        let params = RuleParams::Technical {
            rsi_length: 14,
            ema_fast: 12,
            ema_slow: 26,
            ema_signal: 9,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["type"], "technical");
        assert_eq!(json["rsi_length"], 14);

        let back: RuleParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_build_rule_names() {
        let technical = RuleParams::Technical {
            rsi_length: 14,
            ema_fast: 12,
            ema_slow: 26,
            ema_signal: 9,
        };
        assert_eq!(technical.build().name(), "Technical");

        let breakout = RuleParams::Breakout { min_volume: 1.0 };
        assert_eq!(breakout.build().name(), "Breakout");
    }
}
