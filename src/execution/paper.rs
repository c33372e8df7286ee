//! Paper execution
//!
//! Wraps a market-data source and simulates market fills at the last
//! traded price. Simulated positions are tracked per (symbol, side) with a
//! size-weighted average entry.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Exchange, Interval};
use crate::error::HedgeError;
use crate::models::{Candle, Leg, OrderResult, PositionInfo, PositionSide, TradingState};
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
struct SimulatedPosition {
    quantity: Decimal,
    entry_price: Decimal,
}

pub struct PaperExchange<M: Exchange> {
    market: M,
    positions: RwLock<HashMap<(String, PositionSide), SimulatedPosition>>,
}

impl<M: Exchange> PaperExchange<M> {
    pub fn new(market: M) -> Self {
        Self {
            market,
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Start with the open legs of previously persisted states already booked,
    /// so restored legs can be closed after a restart
    pub fn with_positions<'a>(market: M, states: impl IntoIterator<Item = &'a TradingState>) -> Self {
        let mut positions = HashMap::new();
        for state in states {
            for (leg, side) in [(Leg::Call, PositionSide::Long), (Leg::Put, PositionSide::Short)] {
                if let Some(open) = state.leg(leg).filter(|open| open.quantity > Decimal::ZERO) {
                    positions.insert(
                        (state.symbol().to_string(), side),
                        SimulatedPosition {
                            quantity: open.quantity,
                            entry_price: open.entry_price,
                        },
                    );
                }
            }
        }

        tracing::info!("📝 Paper book restored with {} open positions", positions.len());
        Self {
            market,
            positions: RwLock::new(positions),
        }
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    async fn fill_open(&self, symbol: &str, side: PositionSide, notional: Decimal) -> OrderResult {
        let price = match self.market.get_last_price(symbol).await {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => return OrderResult::failed(format!("invalid price {} for {}", price, symbol)),
            Err(e) => return OrderResult::failed(e.to_string()),
        };
        if notional <= Decimal::ZERO {
            return OrderResult::failed("notional must be positive");
        }

        let quantity = notional / price;
        let mut positions = match self.positions.write() {
            Ok(guard) => guard,
            Err(_) => return OrderResult::failed("paper position book poisoned"),
        };
        let position = positions.entry((symbol.to_string(), side)).or_default();
        let total = position.quantity + quantity;
        position.entry_price = (position.entry_price * position.quantity + price * quantity) / total;
        position.quantity = total;

        let order_id = Uuid::new_v4().to_string();
        tracing::info!(
            "📝 PAPER OPEN {} {}: {} @ {} (order {})",
            side.as_str(),
            symbol,
            quantity,
            price,
            order_id
        );
        OrderResult::filled(order_id, quantity, price)
    }

    async fn fill_close(&self, symbol: &str, side: PositionSide, quantity: Decimal) -> OrderResult {
        let price = match self.market.get_last_price(symbol).await {
            Ok(price) => price,
            Err(e) => return OrderResult::failed(e.to_string()),
        };

        let mut positions = match self.positions.write() {
            Ok(guard) => guard,
            Err(_) => return OrderResult::failed("paper position book poisoned"),
        };
        let key = (symbol.to_string(), side);
        let held = positions.get(&key).map(|p| p.quantity).unwrap_or(Decimal::ZERO);
        if held <= Decimal::ZERO {
            return OrderResult::failed(format!("no {} position for {}", side.as_str(), symbol));
        }

        let filled = quantity.min(held);
        if filled == held {
            positions.remove(&key);
        } else if let Some(position) = positions.get_mut(&key) {
            position.quantity -= filled;
        }

        let order_id = Uuid::new_v4().to_string();
        tracing::info!(
            "📝 PAPER CLOSE {} {}: {} @ {} (order {})",
            side.as_str(),
            symbol,
            filled,
            price,
            order_id
        );
        OrderResult::filled(order_id, filled, price)
    }
}

#[async_trait]
impl<M: Exchange> Exchange for PaperExchange<M> {
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal> {
        self.market.get_last_price(symbol).await
    }

    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        self.market.get_candles(symbol, interval, limit).await
    }

    async fn open_long(&self, symbol: &str, notional: Decimal) -> OrderResult {
        self.fill_open(symbol, PositionSide::Long, notional).await
    }

    async fn close_long(&self, symbol: &str, quantity: Decimal) -> OrderResult {
        self.fill_close(symbol, PositionSide::Long, quantity).await
    }

    async fn open_short(&self, symbol: &str, notional: Decimal) -> OrderResult {
        self.fill_open(symbol, PositionSide::Short, notional).await
    }

    async fn close_short(&self, symbol: &str, quantity: Decimal) -> OrderResult {
        self.fill_close(symbol, PositionSide::Short, quantity).await
    }

    async fn get_position(&self, symbol: &str, side: PositionSide) -> Result<PositionInfo> {
        let position = self
            .positions
            .read()
            .map_err(|_| HedgeError::Execution("paper position book poisoned".to_string()))?
            .get(&(symbol.to_string(), side))
            .copied()
            .unwrap_or_default();

        let unrealized_pnl = if position.quantity > Decimal::ZERO {
            let price = self.market.get_last_price(symbol).await?;
            match side {
                PositionSide::Long => (price - position.entry_price) * position.quantity,
                PositionSide::Short => (position.entry_price - price) * position.quantity,
            }
        } else {
            Decimal::ZERO
        };

        Ok(PositionInfo {
            symbol: symbol.to_string(),
            side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            unrealized_pnl,
        })
    }
}
