//! Regime/hedge decision engine
//!
//! Owns one `TradingState` per tracked symbol. The daily handler classifies
//! the regime and force-closes the disfavored leg on a flip. The 5-minute
//! handler runs entry, hedge and profit-taking rules for the current regime:
//!
//! 1. Entry signal with the primary leg flat: enter primary, drop any hedge,
//!    stop evaluating.
//! 2. Primary open: in profit, any exit rule closes both legs; at a loss with
//!    no hedge, open the hedge.
//! 3. Entry signal while hedged: drop the hedge.
//! 4. Counter signal with primary open: in profit, close primary; at a loss
//!    with no hedge, open the hedge.
//!
//! In an UP regime the long ("call") leg is primary and the long signal is
//! the entry signal; DOWN mirrors this with the short ("put") leg.
//!
//! Handlers take `&mut self` and await every order before touching state, so
//! a symbol's state is never mutated concurrently. Callers deliver events for
//! one symbol sequentially.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::exit_rules::ExitRuleEvaluator;
use super::signals::{generate_signals, Signals};
use crate::config::StrategyConfig;
use crate::execution::Exchange;
use crate::models::{Candle, Leg, OpenLeg, OrderResult, Regime, TradingState};
use crate::persistence::StateRepository;
use crate::regime::RegimeDetector;

pub struct HedgeStrategy<E: Exchange, R: StateRepository> {
    exchange: E,
    repository: R,
    config: StrategyConfig,
    exit_rules: ExitRuleEvaluator,
    regime_detector: RegimeDetector,
    states: HashMap<String, TradingState>,
}

impl<E: Exchange, R: StateRepository> HedgeStrategy<E, R> {
    pub fn new(exchange: E, repository: R, config: StrategyConfig) -> Self {
        Self {
            exit_rules: ExitRuleEvaluator::new(&config),
            regime_detector: RegimeDetector::new(config.rsi_length),
            exchange,
            repository,
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Validate config and load (or create) state for every configured symbol
    ///
    /// Returns false instead of erroring; nothing is retried.
    pub async fn start(&mut self) -> bool {
        tracing::info!("🚀 Starting hedge strategy...");

        if let Err(e) = self.config.validate() {
            tracing::error!("❌ Failed to start: {}", e);
            return false;
        }

        let mut loaded = self.repository.load_all().await;
        for symbol in &self.config.symbols {
            let state = match loaded.remove(symbol) {
                Some(state) => {
                    tracing::info!(
                        "[START-{}] Loaded state: regime={}, long={}, short={}",
                        symbol,
                        state.regime,
                        state.pos_call(),
                        state.pos_put()
                    );
                    state
                }
                None => {
                    tracing::info!("[START-{}] Created new state", symbol);
                    TradingState::new(symbol.as_str())
                }
            };
            self.states.insert(symbol.clone(), state);
        }

        tracing::info!("✅ Strategy started with {} symbols", self.states.len());
        true
    }

    /// Persist the whole state map
    pub async fn stop(&self) {
        tracing::info!("🛑 Stopping strategy...");
        if let Err(e) = self.repository.save_all(&self.states).await {
            tracing::error!("Failed to save state on shutdown: {}", e);
            return;
        }
        tracing::info!("Strategy stopped");
    }

    /// Snapshot of every tracked state
    pub fn get_current_states(&self) -> HashMap<String, TradingState> {
        self.states.clone()
    }

    pub fn state(&self, symbol: &str) -> Option<&TradingState> {
        self.states.get(symbol)
    }

    /// Reclassify the regime from daily candles
    ///
    /// Returns the stored regime after the update, or `None` when the symbol
    /// is untracked or the candles are too few to classify.
    pub async fn on_new_daily(&mut self, symbol: &str, daily_candles: &[Candle]) -> Option<Regime> {
        let current = match self.states.get(symbol) {
            Some(state) => state.regime,
            None => {
                tracing::warn!("[DAILY-{}] Symbol not tracked", symbol);
                return None;
            }
        };

        let reading = match self.regime_detector.detect_regime(daily_candles) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!("[DAILY-{}] Keeping regime {}: {}", symbol, current, e);
                return None;
            }
        };

        tracing::info!(
            "[DAILY-{}] RSI={:.2}, MACD={:.2}, Regime={}",
            symbol,
            reading.rsi,
            reading.macd,
            reading.regime
        );

        if reading.regime != current {
            tracing::info!("[DAILY-{}] Regime changed: {} -> {}", symbol, current, reading.regime);
            // the new regime's primary leg survives, the other one goes
            let disfavored = reading.regime.primary_leg().opposite();
            if self.has_leg(symbol, disfavored) {
                tracing::info!(
                    "[DAILY-{}] Closing {} leg (regime turned {})",
                    symbol,
                    disfavored,
                    reading.regime
                );
                self.close_position(symbol, disfavored).await;
            }
        }

        let state = self.states.get_mut(symbol)?;
        state.regime = reading.regime;
        self.persist(symbol).await;
        Some(reading.regime)
    }

    /// Run the intraday rules for one 5-minute update, then persist the symbol
    pub async fn on_new_5m(
        &mut self,
        symbol: &str,
        candles_5m: &[Candle],
        current_price: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        let regime = match self.states.get_mut(symbol) {
            Some(state) => {
                state.update_favorable_price(current_price);
                state.regime
            }
            None => {
                tracing::warn!("[5M-{}] Symbol not tracked", symbol);
                return;
            }
        };

        let signals = generate_signals(candles_5m, self.config.rsi_length);
        tracing::debug!(
            "[5M-{}] price={} long={} short={} regime={}",
            symbol,
            current_price,
            signals.long,
            signals.short,
            regime
        );

        self.handle_regime(symbol, regime, signals, candles_5m, current_price, timestamp)
            .await;

        self.persist(symbol).await;
    }

    async fn handle_regime(
        &mut self,
        symbol: &str,
        regime: Regime,
        signals: Signals,
        candles: &[Candle],
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        let primary = regime.primary_leg();
        let hedge = primary.opposite();
        let (entry_signal, counter_signal) = match regime {
            Regime::Up => (signals.long, signals.short),
            Regime::Down => (signals.short, signals.long),
        };

        // 1. Fresh entry always clears a stale hedge
        if entry_signal && !self.has_leg(symbol, primary) {
            tracing::info!("[{}-{}] Entry signal, entering {}", regime, symbol, primary);
            self.enter_position(symbol, primary, price, timestamp).await;
            if self.has_leg(symbol, hedge) {
                tracing::info!("[{}-{}] Fresh entry, dropping {} hedge", regime, symbol, hedge);
                self.close_position(symbol, hedge).await;
            }
            return;
        }

        // 2. Manage the open primary leg
        if let Some(pnl) = self.open_pnl(symbol, primary, price) {
            if pnl >= Decimal::ZERO {
                let exit = self
                    .states
                    .get(symbol)
                    .and_then(|state| self.exit_rules.evaluate(state, price, candles, timestamp));
                if let Some(exit) = exit {
                    tracing::info!(
                        "[{}-{}] Exit rule {:?} on {} leg, closing all legs",
                        regime,
                        symbol,
                        exit.reason,
                        exit.leg
                    );
                    self.close_all_positions(symbol).await;
                }
            } else if !self.has_leg(symbol, hedge) {
                tracing::info!(
                    "[{}-{}] {} leg losing ({}), entering {} hedge",
                    regime,
                    symbol,
                    primary,
                    pnl,
                    hedge
                );
                self.enter_position(symbol, hedge, price, timestamp).await;
            }
        }

        // 3. Entry signal reappeared while hedged
        if entry_signal && self.has_leg(symbol, hedge) {
            tracing::info!("[{}-{}] Entry signal reappeared, closing {} hedge", regime, symbol, hedge);
            self.close_position(symbol, hedge).await;
        }

        // 4. Counter signal against the primary leg
        if counter_signal {
            if let Some(pnl) = self.open_pnl(symbol, primary, price) {
                if pnl >= Decimal::ZERO {
                    tracing::info!(
                        "[{}-{}] Counter signal, taking {} profit ({})",
                        regime,
                        symbol,
                        primary,
                        pnl
                    );
                    self.close_position(symbol, primary).await;
                } else if !self.has_leg(symbol, hedge) {
                    tracing::info!(
                        "[{}-{}] Counter signal with {} losing ({}), entering {} hedge",
                        regime,
                        symbol,
                        primary,
                        pnl,
                        hedge
                    );
                    self.enter_position(symbol, hedge, price, timestamp).await;
                }
            }
        }
    }

    fn has_leg(&self, symbol: &str, leg: Leg) -> bool {
        self.states.get(symbol).is_some_and(|state| state.has_leg(leg))
    }

    /// Unrealized P&L of an open leg, `None` when the leg is flat
    fn open_pnl(&self, symbol: &str, leg: Leg, price: Decimal) -> Option<Decimal> {
        self.states
            .get(symbol)
            .filter(|state| state.has_leg(leg))
            .map(|state| state.pnl(leg, price))
    }

    /// Open `leg` at market; state changes only on a reported fill
    async fn enter_position(
        &mut self,
        symbol: &str,
        leg: Leg,
        current_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let notional = self.config.call_size;
        let result = match leg {
            Leg::Call => self.exchange.open_long(symbol, notional).await,
            Leg::Put => self.exchange.open_short(symbol, notional).await,
        };

        if !result.success {
            tracing::warn!("[ENTER-{}-{}] FAILED: {}", leg, symbol, result.error_message());
            return false;
        }
        if result.filled_quantity <= Decimal::ZERO {
            tracing::warn!("[ENTER-{}-{}] Order accepted but nothing filled", leg, symbol);
            return false;
        }

        let Some(state) = self.states.get_mut(symbol) else {
            return false;
        };
        state.open_leg(
            leg,
            OpenLeg {
                quantity: result.filled_quantity,
                entry_price: result.avg_price,
                entry_time: timestamp,
                max_favorable_price: current_price,
            },
        );

        tracing::info!(
            "[ENTER-{}-{}] Qty={}, Price={}",
            leg,
            symbol,
            result.filled_quantity,
            result.avg_price
        );
        true
    }

    /// Close the whole of `leg`; a flat leg is a no-op
    ///
    /// A short fill keeps the unfilled remainder open and reports false.
    async fn close_position(&mut self, symbol: &str, leg: Leg) -> bool {
        let Some(quantity) = self
            .states
            .get(symbol)
            .and_then(|state| state.leg(leg))
            .map(|open| open.quantity)
        else {
            return false;
        };

        let result = match leg {
            Leg::Call => self.exchange.close_long(symbol, quantity).await,
            Leg::Put => self.exchange.close_short(symbol, quantity).await,
        };

        if !result.success {
            tracing::warn!("[CLOSE-{}-{}] FAILED: {}", leg, symbol, result.error_message());
            return false;
        }

        if result.filled_quantity < quantity {
            let remaining = match self.states.get_mut(symbol) {
                Some(state) => state.reduce_leg(leg, result.filled_quantity),
                None => return false,
            };
            tracing::warn!(
                "[CLOSE-{}-{}] Partial fill: {} of {} at {}, {} still open",
                leg,
                symbol,
                result.filled_quantity,
                quantity,
                result.avg_price,
                remaining
            );
            return false;
        }

        let closed = self.states.get_mut(symbol).and_then(|state| state.close_leg(leg));
        tracing::info!(
            "[CLOSE-{}-{}] Qty={}, Price={}, Realized={}",
            leg,
            symbol,
            result.filled_quantity,
            result.avg_price,
            closed
                .map(|open| realized_pnl(leg, &open, &result))
                .unwrap_or(Decimal::ZERO)
        );
        true
    }

    /// Long leg first, then short
    async fn close_all_positions(&mut self, symbol: &str) {
        self.close_position(symbol, Leg::Call).await;
        self.close_position(symbol, Leg::Put).await;
    }

    async fn persist(&self, symbol: &str) {
        let Some(state) = self.states.get(symbol) else {
            return;
        };
        if let Err(e) = self.repository.save(symbol, state).await {
            tracing::warn!("[STATE-{}] Failed to save state: {}", symbol, e);
        }
    }
}

fn realized_pnl(leg: Leg, open: &OpenLeg, result: &OrderResult) -> Decimal {
    if result.avg_price.is_zero() {
        return Decimal::ZERO;
    }
    leg.pnl_per_unit(open.entry_price, result.avg_price) * result.filled_quantity.min(open.quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Interval;
    use crate::models::{PositionInfo, PositionSide};
    use crate::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingExchange {
        orders: Mutex<u32>,
    }

    #[async_trait]
    impl Exchange for CountingExchange {
        async fn get_last_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(dec!(100))
        }

        async fn get_candles(&self, _symbol: &str, _interval: Interval, _limit: usize) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn open_long(&self, _symbol: &str, notional: Decimal) -> OrderResult {
            *self.orders.lock().unwrap() += 1;
            OrderResult::filled("1", notional / dec!(100), dec!(100))
        }

        async fn close_long(&self, _symbol: &str, quantity: Decimal) -> OrderResult {
            *self.orders.lock().unwrap() += 1;
            OrderResult::filled("2", quantity, dec!(100))
        }

        async fn open_short(&self, _symbol: &str, notional: Decimal) -> OrderResult {
            *self.orders.lock().unwrap() += 1;
            OrderResult::filled("3", notional / dec!(100), dec!(100))
        }

        async fn close_short(&self, _symbol: &str, quantity: Decimal) -> OrderResult {
            *self.orders.lock().unwrap() += 1;
            OrderResult::filled("4", quantity, dec!(100))
        }

        async fn get_position(&self, symbol: &str, side: PositionSide) -> Result<PositionInfo> {
            Ok(PositionInfo {
                symbol: symbol.to_string(),
                side,
                quantity: Decimal::ZERO,
                entry_price: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
            })
        }
    }

    #[derive(Default)]
    struct NullRepository;

    #[async_trait]
    impl StateRepository for NullRepository {
        async fn load_all(&self) -> HashMap<String, TradingState> {
            HashMap::new()
        }

        async fn save(&self, _symbol: &str, _state: &TradingState) -> Result<()> {
            Ok(())
        }

        async fn save_all(&self, _states: &HashMap<String, TradingState>) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            ..Default::default()
        }
    }

    async fn started() -> HedgeStrategy<CountingExchange, NullRepository> {
        let mut strategy = HedgeStrategy::new(CountingExchange::default(), NullRepository, config());
        assert!(strategy.start().await);
        strategy
    }

    #[tokio::test]
    async fn test_close_flat_leg_is_noop() {
        let mut strategy = started().await;

        assert!(!strategy.close_position("BTCUSDT", Leg::Put).await);
        assert_eq!(*strategy.exchange().orders.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enter_uses_event_timestamp_and_price() {
        let mut strategy = started().await;
        let at = Utc::now() - Duration::hours(3);

        assert!(strategy.enter_position("BTCUSDT", Leg::Put, dec!(101), at).await);

        let put = strategy.state("BTCUSDT").unwrap().put.clone().unwrap();
        assert_eq!(put.quantity, dec!(0.1));
        assert_eq!(put.entry_price, dec!(100));
        assert_eq!(put.entry_time, at);
        assert_eq!(put.max_favorable_price, dec!(101));
    }

    #[tokio::test]
    async fn test_close_all_flattens_both_legs() {
        let mut strategy = started().await;
        let now = Utc::now();
        strategy.enter_position("BTCUSDT", Leg::Call, dec!(100), now).await;
        strategy.enter_position("BTCUSDT", Leg::Put, dec!(100), now).await;

        strategy.close_all_positions("BTCUSDT").await;

        let state = strategy.state("BTCUSDT").unwrap();
        assert!(state.call.is_none() && state.put.is_none());
        assert_eq!(*strategy.exchange().orders.lock().unwrap(), 4);
    }

    #[test]
    fn test_realized_pnl_short() {
        let open = OpenLeg {
            quantity: dec!(2),
            entry_price: dec!(100),
            entry_time: Utc::now(),
            max_favorable_price: dec!(95),
        };
        let result = OrderResult::filled("x", dec!(2), dec!(95));
        assert_eq!(realized_pnl(Leg::Put, &open, &result), dec!(10));
    }
}
