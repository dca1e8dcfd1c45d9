use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::session::{self, SessionState};
use super::subscriptions::SubscriptionBook;
use super::{OrderRequest, StreamEvent, VenueApi};
use crate::events::EventLog;
use crate::execution::{spawn_fill_poll, OrderIntent, StrategyInstance};
use crate::models::{Balance, Candle, Contract, OrderStatus, Quote, Side, Timeframe, Trade, Venue};
use crate::strategy::StrategyConfig;

/// One venue's connectivity hub
///
/// Owns the REST surface, the instrument catalog, the live price cache, the
/// registry of active strategy instances and the reconnecting WebSocket
/// session task. All inbound dispatch happens on that single task, so tick
/// ordering is strict per venue. Registries are snapshotted under their
/// locks before iteration; no lock is ever held across an await.
pub struct Connector {
    api: Arc<dyn VenueApi>,
    contracts: RwLock<BTreeMap<String, Contract>>,
    balances: RwLock<HashMap<String, Balance>>,
    prices: RwLock<HashMap<String, Quote>>,
    strategies: RwLock<HashMap<Uuid, Arc<Mutex<StrategyInstance>>>>,
    subscriptions: Mutex<SubscriptionBook>,
    pub events: EventLog,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    should_reconnect: AtomicBool,
    connected: AtomicBool,
    session_state: Mutex<SessionState>,
    frame_counter: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl Connector {
    pub fn new(api: Arc<dyn VenueApi>) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Arc::new(Self {
            api,
            contracts: RwLock::new(BTreeMap::new()),
            balances: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            strategies: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(SubscriptionBook::new()),
            events: EventLog::new(),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            should_reconnect: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            session_state: Mutex::new(SessionState::Disconnected),
            frame_counter: AtomicU64::new(0),
            shutdown_tx,
        })
    }

    pub fn venue(&self) -> Venue {
        self.api.venue()
    }

    pub(super) fn api(&self) -> Arc<dyn VenueApi> {
        self.api.clone()
    }

    /// Refresh the instrument catalog and balances; called on startup and
    /// on demand
    pub async fn init(&self) {
        self.refresh_contracts().await;
        self.refresh_balances().await;
        self.events.append(format!(
            "{} connector initialized: {} contracts",
            self.venue(),
            self.contracts.read().unwrap().len()
        ));
    }

    pub async fn refresh_contracts(&self) {
        if let Some(contracts) = self.api.fetch_contracts().await {
            *self.contracts.write().unwrap() = contracts;
        }
    }

    pub async fn refresh_balances(&self) {
        if let Some(balances) = self.api.fetch_balances().await {
            *self.balances.write().unwrap() = balances;
        }
    }

    pub fn contract(&self, symbol: &str) -> Option<Contract> {
        self.contracts.read().unwrap().get(symbol).cloned()
    }

    pub fn contracts_snapshot(&self) -> BTreeMap<String, Contract> {
        self.contracts.read().unwrap().clone()
    }

    pub fn balances_snapshot(&self) -> HashMap<String, Balance> {
        self.balances.read().unwrap().clone()
    }

    pub fn prices_snapshot(&self) -> HashMap<String, Quote> {
        self.prices.read().unwrap().clone()
    }

    /// Live trade records across every active instance, for presentation
    pub fn trades_snapshot(&self) -> Vec<Trade> {
        let instances = self.instances();
        let mut trades = Vec::new();
        for instance in instances {
            trades.extend(instance.lock().unwrap().trades.iter().cloned());
        }
        trades
    }

    // --- venue REST surface ---

    /// Historical candles for a cataloged instrument, oldest first, bounded
    /// to the venue's maximum lookback window
    pub async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Option<Vec<Candle>> {
        let contract = self.contract(symbol)?;
        self.api.fetch_historical_candles(&contract, timeframe).await
    }

    pub async fn place_order(&self, symbol: &str, request: &OrderRequest) -> Option<OrderStatus> {
        let contract = self.contract(symbol)?;
        self.api.place_order(&contract, request).await
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Option<OrderStatus> {
        let contract = self.contract(symbol)?;
        self.api.cancel_order(&contract, order_id).await
    }

    pub async fn order_status(&self, symbol: &str, order_id: &str) -> Option<OrderStatus> {
        let contract = self.contract(symbol)?;
        self.api.order_status(&contract, order_id).await
    }

    // --- session lifecycle ---

    /// Spawn the long-lived WebSocket session task for this venue
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let connector = self.clone();
        tokio::spawn(async move {
            session::run(connector).await;
        })
    }

    /// Stop reconnecting and close the live session
    pub fn shutdown(&self) {
        self.should_reconnect.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect.load(Ordering::SeqCst)
    }

    pub fn session_state(&self) -> SessionState {
        *self.session_state.lock().unwrap()
    }

    pub(super) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(super) fn set_session_state(&self, state: SessionState) {
        *self.session_state.lock().unwrap() = state;
    }

    pub(super) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(super) async fn lock_outbound(
        &self,
    ) -> tokio::sync::MutexGuard<'_, mpsc::UnboundedReceiver<String>> {
        self.outbound_rx.lock().await
    }

    // --- subscriptions ---

    fn next_frame_id(&self) -> u64 {
        self.frame_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Subscribe instruments to a channel; an empty symbol list subscribes
    /// the channel globally. Already-tracked instruments are skipped unless
    /// `force` is set.
    pub fn subscribe(&self, channel: &str, symbols: &[String], force: bool) {
        let plan = {
            let mut book = self.subscriptions.lock().unwrap();
            book.plan(channel, symbols, force)
        };
        let Some(plan) = plan else {
            return;
        };

        tracing::info!(
            "{}: subscribing to {} ({} instruments)",
            self.venue(),
            plan.channel,
            plan.symbols.len()
        );

        let frame = self
            .api
            .subscribe_frame(&plan.channel, &plan.symbols, self.next_frame_id());
        let _ = self.outbound_tx.send(frame);
    }

    /// Frames re-sending every tracked subscription, used on reconnect
    pub(super) fn resubscribe_frames(&self) -> Vec<String> {
        let plans = self.subscriptions.lock().unwrap().tracked_by_channel();
        plans
            .into_iter()
            .map(|plan| {
                self.api
                    .subscribe_frame(&plan.channel, &plan.symbols, self.next_frame_id())
            })
            .collect()
    }

    /// Make sure the venue's default market-data subscriptions exist
    pub(super) fn ensure_default_subscriptions(&self) {
        for (channel, symbols) in self.api.default_subscriptions() {
            self.subscribe(&channel, &symbols, false);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Subscribe the market-data channels for one instrument
    pub fn watch_instrument(&self, symbol: &str) {
        for (channel, symbols) in self.api.market_channels(symbol) {
            self.subscribe(&channel, &symbols, false);
        }
    }

    // --- strategy registry ---

    /// Activate a strategy instance: seed its candle series from the
    /// venue's historical data and subscribe its market-data channels
    pub async fn activate_strategy(&self, config: StrategyConfig) -> Option<Uuid> {
        let Some(contract) = self.contract(&config.symbol) else {
            tracing::error!(
                "cannot activate strategy: unknown contract {} on {}",
                config.symbol,
                self.venue()
            );
            return None;
        };

        let history = self
            .api
            .fetch_historical_candles(&contract, config.timeframe)
            .await
            .unwrap_or_default();

        let symbol = config.symbol.clone();
        let timeframe = config.timeframe;
        let instance = match StrategyInstance::new(config, contract, history) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::error!("cannot activate strategy on {}: {}", symbol, e);
                return None;
            }
        };
        let id = instance.id;
        let name = instance.strategy_name();

        self.strategies
            .write()
            .unwrap()
            .insert(id, Arc::new(Mutex::new(instance)));

        self.watch_instrument(&symbol);

        self.events.append(format!(
            "{} strategy activated on {} {} ({})",
            name,
            symbol,
            timeframe,
            self.venue()
        ));

        Some(id)
    }

    /// Drop an instance and its state; WebSocket subscriptions are retained
    pub fn deactivate_strategy(&self, id: Uuid) -> bool {
        let removed = self.strategies.write().unwrap().remove(&id);
        match removed {
            Some(instance) => {
                let inst = instance.lock().unwrap();
                self.events.append(format!(
                    "{} strategy deactivated on {} {}",
                    inst.strategy_name(),
                    inst.contract.symbol,
                    inst.config.timeframe
                ));
                true
            }
            None => false,
        }
    }

    fn instances(&self) -> Vec<Arc<Mutex<StrategyInstance>>> {
        self.strategies.read().unwrap().values().cloned().collect()
    }

    /// Snapshot of instances watching a symbol, taken under the read lock
    /// so dispatch never iterates a structure being mutated
    fn instances_for(&self, symbol: &str) -> Vec<Arc<Mutex<StrategyInstance>>> {
        self.strategies
            .read()
            .unwrap()
            .values()
            .filter(|i| i.lock().unwrap().contract.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn strategy_instance(&self, id: Uuid) -> Option<Arc<Mutex<StrategyInstance>>> {
        self.strategies.read().unwrap().get(&id).cloned()
    }

    // --- inbound dispatch ---

    /// Classify one inbound stream event and fan it out to matching
    /// strategy instances. Runs on the venue's WebSocket task.
    pub(super) async fn dispatch(&self, event: StreamEvent) {
        match event {
            StreamEvent::Quote { symbol, bid, ask } => {
                let merged = {
                    let mut prices = self.prices.write().unwrap();
                    let quote = prices.entry(symbol.clone()).or_default();
                    if bid.is_some() {
                        quote.bid = bid;
                    }
                    if ask.is_some() {
                        quote.ask = ask;
                    }
                    *quote
                };

                // PnL recompute only; the candle series is never touched here
                for instance in self.instances_for(&symbol) {
                    instance.lock().unwrap().on_quote(&merged);
                }
            }
            StreamEvent::TradeTick {
                symbol,
                price,
                size,
                ts,
            } => {
                let now = Utc::now().timestamp_millis();
                for instance in self.instances_for(&symbol) {
                    let intents = {
                        let mut inst = instance.lock().unwrap();
                        inst.on_trade_tick(price, size, ts, now)
                    };
                    self.execute_intents(&instance, intents).await;
                }
            }
        }
    }

    // --- order lifecycle ---

    async fn execute_intents(
        &self,
        instance: &Arc<Mutex<StrategyInstance>>,
        intents: Vec<OrderIntent>,
    ) {
        for intent in intents {
            match intent {
                OrderIntent::Open { side } => self.open_position(instance, side).await,
                OrderIntent::Close {
                    trade_id,
                    order_side,
                    quantity,
                    reason: _,
                } => {
                    let contract = instance.lock().unwrap().contract.clone();
                    let request = OrderRequest::market(order_side, quantity);

                    match self.api.place_order(&contract, &request).await {
                        Some(_status) => {
                            instance.lock().unwrap().record_close(trade_id);
                        }
                        None => {
                            // Deliberately no automatic retry: the next
                            // threshold crossing re-attempts the exit
                            instance.lock().unwrap().events.append(format!(
                                "exit order on {} failed; position remains open",
                                contract.symbol
                            ));
                        }
                    }
                }
            }
        }
    }

    async fn open_position(&self, instance: &Arc<Mutex<StrategyInstance>>, side: Side) {
        let (contract, balance_pct, reference_price) = {
            let inst = instance.lock().unwrap();
            let Some(last) = inst.series.last() else {
                return;
            };
            inst.events.append(format!(
                "{} signal on {} {}",
                side, inst.contract.symbol, inst.config.timeframe
            ));
            (inst.contract.clone(), inst.config.balance_pct, last.close)
        };

        let size = self
            .api
            .trade_size(&contract, reference_price, balance_pct)
            .await;
        let Some(size) = size else {
            instance.lock().unwrap().events.append(format!(
                "aborting {} open on {}: no usable balance",
                side, contract.symbol
            ));
            return;
        };
        if size <= 0.0 {
            instance.lock().unwrap().events.append(format!(
                "aborting {} open on {}: computed size is zero",
                side, contract.symbol
            ));
            return;
        }

        let request = OrderRequest::market(side.entry_order(), size);
        match self.api.place_order(&contract, &request).await {
            Some(status) => {
                let needs_poll = !status.is_filled();
                let order_id = status.order_id.clone();
                {
                    let mut inst = instance.lock().unwrap();
                    inst.record_open(side, &status);
                }
                if needs_poll {
                    let _ = spawn_fill_poll(
                        self.api.clone(),
                        contract,
                        instance.clone(),
                        order_id,
                        self.shutdown_receiver(),
                    );
                }
            }
            None => {
                instance.lock().unwrap().events.append(format!(
                    "entry order on {} failed; no position opened",
                    contract.symbol
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candle, ContractKind, OrderStatus, Timeframe};
    use crate::strategy::RuleParams;
    use async_trait::async_trait;

    /// Venue stub with a one-contract catalog and scripted order handling
    struct StubVenue {
        trade_size_response: Option<f64>,
        fill_immediately: bool,
        orders: Mutex<Vec<OrderRequest>>,
        order_counter: AtomicU64,
    }

    impl StubVenue {
        fn new() -> Self {
            Self {
                trade_size_response: Some(2.0),
                fill_immediately: true,
                orders: Mutex::new(Vec::new()),
                order_counter: AtomicU64::new(0),
            }
        }

        fn placed_orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }
    }

    fn stub_contract() -> Contract {
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

    #[async_trait]
    impl VenueApi for StubVenue {
        fn venue(&self) -> Venue {
            Venue::BinanceFutures
        }

        async fn fetch_contracts(&self) -> Option<BTreeMap<String, Contract>> {
            let mut contracts = BTreeMap::new();
            contracts.insert("BTCUSDT".to_string(), stub_contract());
            Some(contracts)
        }

        async fn fetch_balances(&self) -> Option<HashMap<String, Balance>> {
            Some(HashMap::new())
        }

        async fn fetch_historical_candles(
            &self,
            _contract: &Contract,
            timeframe: Timeframe,
        ) -> Option<Vec<Candle>> {
            // Two flat candles so the breakout rule has a prior bar
            Some(vec![
                Candle {
                    ts: 0,
                    open: 100.0,
                    high: 100.0,
                    low: 100.0,
                    close: 100.0,
                    volume: 10.0,
                    timeframe,
                },
                Candle {
                    ts: 60_000,
                    open: 100.0,
                    high: 100.0,
                    low: 100.0,
                    close: 100.0,
                    volume: 10.0,
                    timeframe,
                },
            ])
        }

        async fn fetch_book_ticker(&self, _contract: &Contract) -> Option<Quote> {
            None
        }

        async fn place_order(
            &self,
            _contract: &Contract,
            request: &OrderRequest,
        ) -> Option<OrderStatus> {
            self.orders.lock().unwrap().push(request.clone());
            let id = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Some(OrderStatus {
                order_id: id.to_string(),
                status: if self.fill_immediately {
                    "filled".to_string()
                } else {
                    "new".to_string()
                },
                avg_price: 105.0,
                executed_qty: request.quantity,
            })
        }

        async fn cancel_order(&self, _contract: &Contract, _order_id: &str) -> Option<OrderStatus> {
            None
        }

        async fn order_status(&self, _contract: &Contract, order_id: &str) -> Option<OrderStatus> {
            Some(OrderStatus {
                order_id: order_id.to_string(),
                status: "filled".to_string(),
                avg_price: 105.0,
                executed_qty: 2.0,
            })
        }

        async fn trade_size(
            &self,
            _contract: &Contract,
            _price: f64,
            _balance_pct: f64,
        ) -> Option<f64> {
            self.trade_size_response
        }

        fn ws_url(&self) -> String {
            "wss://unused".to_string()
        }

        fn subscribe_frame(&self, channel: &str, symbols: &[String], frame_id: u64) -> String {
            format!("{}:{}:{}", channel, symbols.join(","), frame_id)
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

        fn parse_message(&self, _text: &str) -> Vec<StreamEvent> {
            Vec::new()
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

    async fn ready_connector(api: Arc<StubVenue>) -> Arc<Connector> {
        let connector = Connector::new(api);
        connector.refresh_contracts().await;
        connector
    }

    fn tick(symbol: &str, price: f64, ts: i64) -> StreamEvent {
        StreamEvent::TradeTick {
            symbol: symbol.to_string(),
            price,
            size: 2.0,
            ts,
        }
    }

    #[tokio::test]
    async fn test_breakout_tick_opens_position() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api.clone()).await;

        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        // Breakout above the seeded candles' high in a fresh bucket
        connector.dispatch(tick("BTCUSDT", 105.0, 120_000)).await;

        let orders = api.placed_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, crate::models::OrderSide::Buy);

        let instance = connector.strategy_instance(id).unwrap();
        let inst = instance.lock().unwrap();
        assert!(inst.ongoing_position);
        let trade = inst.open_trade().unwrap();
        assert_eq!(trade.entry_price, Some(105.0));
        assert_eq!(trade.side, Side::Long);
    }

    #[tokio::test]
    async fn test_take_profit_closes_position() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api.clone()).await;
        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        connector.dispatch(tick("BTCUSDT", 105.0, 120_000)).await;
        // Entry at 105; +5% take profit crosses at 110.25
        connector.dispatch(tick("BTCUSDT", 110.5, 130_000)).await;

        let orders = api.placed_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, crate::models::OrderSide::Sell);
        assert_eq!(orders[1].quantity, 2.0);

        let instance = connector.strategy_instance(id).unwrap();
        let inst = instance.lock().unwrap();
        assert!(!inst.ongoing_position);
        assert!(inst.open_trade().is_none());
    }

    #[tokio::test]
    async fn test_open_aborts_without_usable_balance() {
        let api = Arc::new(StubVenue {
            trade_size_response: None,
            ..StubVenue::new()
        });
        let connector = ready_connector(api.clone()).await;
        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        connector.dispatch(tick("BTCUSDT", 105.0, 120_000)).await;

        assert!(api.placed_orders().is_empty());

        let instance = connector.strategy_instance(id).unwrap();
        let inst = instance.lock().unwrap();
        assert!(!inst.ongoing_position);
        assert!(inst
            .events
            .snapshot()
            .iter()
            .any(|e| e.message.contains("no usable balance")));
    }

    #[tokio::test]
    async fn test_quote_updates_price_cache_and_pnl() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api.clone()).await;
        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        connector.dispatch(tick("BTCUSDT", 105.0, 120_000)).await;

        // Partial updates merge in the cache
        connector
            .dispatch(StreamEvent::Quote {
                symbol: "BTCUSDT".to_string(),
                bid: Some(110.0),
                ask: None,
            })
            .await;
        connector
            .dispatch(StreamEvent::Quote {
                symbol: "BTCUSDT".to_string(),
                bid: None,
                ask: Some(110.4),
            })
            .await;

        let prices = connector.prices_snapshot();
        let quote = prices.get("BTCUSDT").unwrap();
        assert_eq!(quote.bid, Some(110.0));
        assert_eq!(quote.ask, Some(110.4));

        // Long entry at 105 marked against the bid: (110 - 105) * 2
        let instance = connector.strategy_instance(id).unwrap();
        let inst = instance.lock().unwrap();
        assert_eq!(inst.open_trade().unwrap().pnl, 10.0);
    }

    #[tokio::test]
    async fn test_quote_never_mutates_candles() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api.clone()).await;
        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        let before = {
            let instance = connector.strategy_instance(id).unwrap();
            let inst = instance.lock().unwrap();
            inst.series.candles().to_vec()
        };

        connector
            .dispatch(StreamEvent::Quote {
                symbol: "BTCUSDT".to_string(),
                bid: Some(999.0),
                ask: Some(999.5),
            })
            .await;

        let instance = connector.strategy_instance(id).unwrap();
        let inst = instance.lock().unwrap();
        assert_eq!(inst.series.len(), before.len());
        assert_eq!(
            inst.series.last().unwrap().close,
            before.last().unwrap().close
        );
    }

    #[tokio::test]
    async fn test_activate_unknown_contract_fails() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api).await;

        let mut config = breakout_config();
        config.symbol = "DOGEUSDT".to_string();
        assert!(connector.activate_strategy(config).await.is_none());
    }

    #[tokio::test]
    async fn test_deactivate_removes_instance() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api.clone()).await;
        let id = connector
            .activate_strategy(breakout_config())
            .await
            .unwrap();

        assert!(connector.deactivate_strategy(id));
        assert!(!connector.deactivate_strategy(id));

        // Ticks for the removed instance are dropped silently
        connector.dispatch(tick("BTCUSDT", 105.0, 120_000)).await;
        assert!(api.placed_orders().is_empty());

        // Subscriptions are retained after deactivation
        assert!(connector.subscription_count() > 0);
    }

    #[tokio::test]
    async fn test_rest_passthrough_requires_cataloged_contract() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api).await;

        let status = connector.order_status("BTCUSDT", "5").await.unwrap();
        assert!(status.is_filled());

        let candles = connector
            .historical_candles("BTCUSDT", Timeframe::M1)
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);

        // Unknown symbols never reach the venue
        assert!(connector.order_status("DOGEUSDT", "5").await.is_none());
        assert!(connector
            .historical_candles("DOGEUSDT", Timeframe::M1)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_tracked_once() {
        let api = Arc::new(StubVenue::new());
        let connector = ready_connector(api).await;

        connector.subscribe("aggTrade", &["BTCUSDT".to_string()], false);
        connector.subscribe("aggTrade", &["BTCUSDT".to_string()], false);

        assert_eq!(connector.subscription_count(), 1);
    }
}
