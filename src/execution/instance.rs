use chrono::Utc;
use uuid::Uuid;

use crate::events::EventLog;
use crate::market::CandleSeries;
use crate::models::{
    Candle, Contract, OrderSide, OrderStatus, Quote, Side, Signal, Trade, TradeStatus,
};
use crate::strategy::{SignalRule, StrategyConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => f.write_str("take profit"),
            ExitReason::StopLoss => f.write_str("stop loss"),
        }
    }
}

/// Order action an instance wants executed
///
/// Instances never talk to the venue themselves; the connector executes
/// intents after releasing the instance lock so no REST call runs under it.
#[derive(Debug, Clone)]
pub enum OrderIntent {
    Open {
        side: Side,
    },
    Close {
        trade_id: Uuid,
        order_side: OrderSide,
        quantity: f64,
        reason: ExitReason,
    },
}

/// One activated strategy: configuration plus all mutable trading state
///
/// Holds the candle series, the trade list and the ongoing-position flag.
/// At most one trade is open at any time; signals are ignored while one is.
pub struct StrategyInstance {
    pub id: Uuid,
    pub config: StrategyConfig,
    pub contract: Contract,
    pub series: CandleSeries,
    pub trades: Vec<Trade>,
    pub ongoing_position: bool,
    pub events: EventLog,
    rule: Box<dyn SignalRule>,
}

impl StrategyInstance {
    pub fn new(
        config: StrategyConfig,
        contract: Contract,
        history: Vec<Candle>,
    ) -> anyhow::Result<Self> {
        if config.balance_pct <= 0.0 || config.balance_pct > 100.0 {
            anyhow::bail!("balance_pct must be within (0, 100]");
        }
        if config.take_profit.is_some_and(|tp| tp <= 0.0) {
            anyhow::bail!("take_profit must be positive");
        }
        if config.stop_loss.is_some_and(|sl| sl <= 0.0) {
            anyhow::bail!("stop_loss must be positive");
        }

        let rule = config.rule.build();
        Ok(Self {
            id: Uuid::new_v4(),
            series: CandleSeries::with_history(config.timeframe, history),
            config,
            contract,
            trades: Vec::new(),
            ongoing_position: false,
            events: EventLog::new(),
            rule,
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.rule.name()
    }

    /// Fold a trade tick into the candle series, then evaluate exits and
    /// entries. Returns the order intents to execute.
    pub fn on_trade_tick(&mut self, price: f64, size: f64, ts: i64, now: i64) -> Vec<OrderIntent> {
        let class = self.series.apply_tick(price, size, ts, now);

        let mut intents = Vec::new();

        // Exits come first: an open trade is managed before new entries
        if let Some(intent) = self.tp_sl_trigger() {
            intents.push(intent);
        }

        if !self.ongoing_position
            && self.rule.triggers_on(class)
            && self.series.len() >= self.rule.min_candles()
        {
            match self.rule.check_signal(self.series.candles()) {
                Signal::Long => intents.push(OrderIntent::Open { side: Side::Long }),
                Signal::Short => intents.push(OrderIntent::Open { side: Side::Short }),
                Signal::None => {}
            }
        }

        intents
    }

    /// Recompute running PnL for open trades from a best bid/ask update
    ///
    /// Longs mark against the bid, shorts against the ask. Never touches
    /// the candle series.
    pub fn on_quote(&mut self, quote: &Quote) {
        let contract = self.contract.clone();
        for trade in &mut self.trades {
            if trade.status != TradeStatus::Open {
                continue;
            }
            let Some(entry_price) = trade.entry_price else {
                continue;
            };
            let mark = match trade.side {
                Side::Long => quote.bid,
                Side::Short => quote.ask,
            };
            if let Some(mark) = mark {
                trade.pnl = contract.pnl(trade.side, entry_price, mark, trade.quantity);
            }
        }
    }

    /// Take-profit / stop-loss evaluation against the latest close
    fn tp_sl_trigger(&self) -> Option<OrderIntent> {
        let current_price = self.series.last()?.close;

        for trade in &self.trades {
            if trade.status != TradeStatus::Open {
                continue;
            }
            let Some(entry_price) = trade.entry_price else {
                continue;
            };

            let take_profit = self.config.take_profit.map(|tp| match trade.side {
                Side::Long => current_price >= entry_price * (1.0 + tp / 100.0),
                Side::Short => current_price <= entry_price * (1.0 - tp / 100.0),
            });
            let stop_loss = self.config.stop_loss.map(|sl| match trade.side {
                Side::Long => current_price <= entry_price * (1.0 - sl / 100.0),
                Side::Short => current_price >= entry_price * (1.0 + sl / 100.0),
            });

            let reason = if stop_loss == Some(true) {
                ExitReason::StopLoss
            } else if take_profit == Some(true) {
                ExitReason::TakeProfit
            } else {
                continue;
            };

            self.events.append(format!(
                "{} hit for {} {} | current price = {}, entry price was {}",
                reason, self.contract.symbol, self.config.timeframe, current_price, entry_price
            ));

            return Some(OrderIntent::Close {
                trade_id: trade.id,
                order_side: trade.side.exit_order(),
                quantity: trade.quantity,
                reason,
            });
        }

        None
    }

    /// Record a freshly placed entry order and raise the ongoing-position
    /// flag. Entry price stays unknown until the fill is confirmed.
    pub fn record_open(&mut self, side: Side, status: &OrderStatus) -> Uuid {
        let entry_price = if status.is_filled() {
            Some(status.avg_price)
        } else {
            None
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            time: Utc::now().timestamp_millis(),
            symbol: self.contract.symbol.clone(),
            strategy: self.rule.name().to_string(),
            side,
            status: TradeStatus::Open,
            entry_price,
            quantity: status.executed_qty,
            pnl: 0.0,
            entry_order_id: status.order_id.clone(),
        };
        let trade_id = trade.id;

        self.trades.push(trade);
        self.ongoing_position = true;

        self.events.append(format!(
            "{} position opened on {} {} | order status: {}",
            side, self.contract.symbol, self.config.timeframe, status.status
        ));

        trade_id
    }

    /// Mark a trade closed after a successful exit order
    pub fn record_close(&mut self, trade_id: Uuid) {
        if let Some(trade) = self.trades.iter_mut().find(|t| t.id == trade_id) {
            trade.status = TradeStatus::Closed;
        }
        self.ongoing_position = false;

        self.events.append(format!(
            "exit order on {} {} placed successfully",
            self.contract.symbol, self.config.timeframe
        ));
    }

    /// Backfill entry price and quantity once the fill poller confirms the
    /// entry order. Returns false if no trade references the order.
    pub fn backfill_fill(&mut self, order_id: &str, status: &OrderStatus) -> bool {
        for trade in &mut self.trades {
            if trade.entry_order_id == order_id {
                trade.entry_price = Some(status.avg_price);
                trade.quantity = status.executed_qty;
                return true;
            }
        }
        false
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.trades
            .iter()
            .find(|t| t.status == TradeStatus::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractKind, Timeframe, Venue};
    use crate::strategy::RuleParams;

    fn contract() -> Contract {
        Contract {
            symbol: "BTCUSDT".to_string(),
            venue: Venue::BinanceFutures,
            quote_currency: "USDT".to_string(),
            tick_size: 0.1,
            lot_size: 0.001,
            price_decimals: 1,
            kind: ContractKind::Linear,
            multiplier: 1.0,
        }
    }

    fn breakout_config() -> StrategyConfig {
        StrategyConfig {
            symbol: "BTCUSDT".to_string(),
            venue: Venue::BinanceFutures,
            timeframe: Timeframe::M1,
            balance_pct: 10.0,
            take_profit: Some(5.0),
            stop_loss: Some(3.0),
            rule: RuleParams::Breakout { min_volume: 1.0 },
        }
    }

    fn history(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                ts: i as i64 * 60_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 10.0,
                timeframe: Timeframe::M1,
            })
            .collect()
    }

    fn filled_status(order_id: &str, price: f64, qty: f64) -> OrderStatus {
        OrderStatus {
            order_id: order_id.to_string(),
            status: "filled".to_string(),
            avg_price: price,
            executed_qty: qty,
        }
    }

    #[test]
    fn test_breakout_tick_produces_open_intent() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();

        // Tick in a fresh bucket breaking above the prior high on volume
        let intents = instance.on_trade_tick(105.0, 2.0, 120_000, 120_000);
        assert_eq!(intents.len(), 1);
        assert!(matches!(
            intents[0],
            OrderIntent::Open { side: Side::Long }
        ));
    }

    #[test]
    fn test_ongoing_position_blocks_second_open() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();

        let intents = instance.on_trade_tick(105.0, 2.0, 120_000, 120_000);
        assert!(matches!(intents[0], OrderIntent::Open { .. }));
        instance.record_open(Side::Long, &filled_status("1", 105.0, 1.0));
        assert!(instance.ongoing_position);

        // Next breakout tick must not produce a second open, whatever the
        // signal value
        let intents = instance.on_trade_tick(104.9, 2.0, 130_000, 130_000);
        assert!(intents
            .iter()
            .all(|i| !matches!(i, OrderIntent::Open { .. })));
    }

    #[test]
    fn test_take_profit_close_intent_for_long() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();
        let trade_id = instance.record_open(Side::Long, &filled_status("1", 100.0, 1.0));

        // +5% take profit threshold at 105
        let intents = instance.on_trade_tick(105.1, 1.0, 120_000, 120_000);
        match &intents[0] {
            OrderIntent::Close {
                trade_id: id,
                order_side,
                quantity,
                reason,
            } => {
                assert_eq!(*id, trade_id);
                assert_eq!(*order_side, OrderSide::Sell);
                assert_eq!(*quantity, 1.0);
                assert_eq!(*reason, ExitReason::TakeProfit);
            }
            other => panic!("expected close intent, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_loss_close_intent_for_short() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();
        instance.record_open(Side::Short, &filled_status("1", 100.0, 1.0));

        // Short stop loss at +3% = 103
        let intents = instance.on_trade_tick(103.5, 1.0, 120_000, 120_000);
        match &intents[0] {
            OrderIntent::Close {
                order_side, reason, ..
            } => {
                assert_eq!(*order_side, OrderSide::Buy);
                assert_eq!(*reason, ExitReason::StopLoss);
            }
            other => panic!("expected close intent, got {:?}", other),
        }
    }

    #[test]
    fn test_no_exit_without_confirmed_entry() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();

        // Entry order placed but not yet filled: entry_price unknown
        let pending = OrderStatus {
            order_id: "1".to_string(),
            status: "new".to_string(),
            avg_price: 0.0,
            executed_qty: 0.0,
        };
        instance.record_open(Side::Long, &pending);
        assert!(instance.open_trade().unwrap().entry_price.is_none());

        let intents = instance.on_trade_tick(200.0, 1.0, 120_000, 120_000);
        assert!(intents
            .iter()
            .all(|i| !matches!(i, OrderIntent::Close { .. })));
    }

    #[test]
    fn test_backfill_fill_sets_entry() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();
        let pending = OrderStatus {
            order_id: "42".to_string(),
            status: "new".to_string(),
            avg_price: 0.0,
            executed_qty: 0.0,
        };
        instance.record_open(Side::Long, &pending);

        assert!(instance.backfill_fill("42", &filled_status("42", 101.5, 0.5)));
        let trade = instance.open_trade().unwrap();
        assert_eq!(trade.entry_price, Some(101.5));
        assert_eq!(trade.quantity, 0.5);

        assert!(!instance.backfill_fill("missing", &filled_status("missing", 1.0, 1.0)));
    }

    #[test]
    fn test_quote_updates_pnl_without_touching_candles() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();
        instance.record_open(Side::Long, &filled_status("1", 100.0, 2.0));

        let candles_before = instance.series.candles().to_vec();

        instance.on_quote(&Quote {
            bid: Some(110.0),
            ask: Some(110.2),
        });

        assert_eq!(instance.open_trade().unwrap().pnl, 20.0);
        assert_eq!(instance.series.candles().len(), candles_before.len());
        assert_eq!(
            instance.series.last().unwrap().close,
            candles_before.last().unwrap().close
        );
    }

    #[test]
    fn test_record_close_clears_flag() {
        let mut instance =
            StrategyInstance::new(breakout_config(), contract(), history(&[100.0, 100.0])).unwrap();
        let trade_id = instance.record_open(Side::Long, &filled_status("1", 100.0, 1.0));

        instance.record_close(trade_id);
        assert!(!instance.ongoing_position);
        assert!(instance.open_trade().is_none());

        // A new breakout can open again afterwards
        let intents = instance.on_trade_tick(105.0, 2.0, 120_000, 120_000);
        assert!(matches!(intents[0], OrderIntent::Open { .. }));
    }
}
