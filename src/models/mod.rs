use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick data
///
/// Candle sequences are always ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Slow-timeframe directional bias
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    #[default]
    Up,
    Down,
}

impl Regime {
    /// The leg this regime treats as the directional bet
    pub fn primary_leg(self) -> Leg {
        match self {
            Regime::Up => Leg::Call,
            Regime::Down => Leg::Put,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Up => write!(f, "UP"),
            Regime::Down => write!(f, "DOWN"),
        }
    }
}

/// One side of a hedged position: long ("call") or short ("put")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    Call,
    Put,
}

impl Leg {
    pub fn opposite(self) -> Leg {
        match self {
            Leg::Call => Leg::Put,
            Leg::Put => Leg::Call,
        }
    }

    /// Price move per unit in this leg's favor
    pub fn pnl_per_unit(self, entry_price: Decimal, price: Decimal) -> Decimal {
        match self {
            Leg::Call => price - entry_price,
            Leg::Put => entry_price - price,
        }
    }

    /// True when `price` improves on `best` for this leg
    pub fn is_more_favorable(self, price: Decimal, best: Decimal) -> bool {
        match self {
            Leg::Call => price > best,
            Leg::Put => price < best,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Call => write!(f, "LONG"),
            Leg::Put => write!(f, "SHORT"),
        }
    }
}

/// An open leg. Quantity, entry price, entry time and the favorable-price
/// extremum exist together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLeg {
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Running max for a long leg, running min for a short leg
    pub max_favorable_price: Decimal,
}

/// Per-symbol decision state, mutated in place across the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    symbol: String,
    pub regime: Regime,
    pub call: Option<OpenLeg>,
    pub put: Option<OpenLeg>,
}

impl TradingState {
    /// Fresh state: regime UP, both legs flat
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            regime: Regime::default(),
            call: None,
            put: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn leg(&self, leg: Leg) -> Option<&OpenLeg> {
        match leg {
            Leg::Call => self.call.as_ref(),
            Leg::Put => self.put.as_ref(),
        }
    }

    fn leg_mut(&mut self, leg: Leg) -> &mut Option<OpenLeg> {
        match leg {
            Leg::Call => &mut self.call,
            Leg::Put => &mut self.put,
        }
    }

    pub fn has_leg(&self, leg: Leg) -> bool {
        self.leg(leg).is_some()
    }

    pub fn open_leg(&mut self, leg: Leg, position: OpenLeg) {
        *self.leg_mut(leg) = Some(position);
    }

    /// Clears every field of the leg at once
    pub fn close_leg(&mut self, leg: Leg) -> Option<OpenLeg> {
        self.leg_mut(leg).take()
    }

    /// Take `quantity` off an open leg, keeping its entry price and time.
    /// Returns the quantity still held.
    pub fn reduce_leg(&mut self, leg: Leg, quantity: Decimal) -> Decimal {
        match self.leg_mut(leg) {
            Some(open) => {
                open.quantity = (open.quantity - quantity).max(Decimal::ZERO);
                open.quantity
            }
            None => Decimal::ZERO,
        }
    }

    /// Quantity held on a leg, zero when flat
    pub fn quantity(&self, leg: Leg) -> Decimal {
        self.leg(leg).map(|l| l.quantity).unwrap_or(Decimal::ZERO)
    }

    pub fn pos_call(&self) -> Decimal {
        self.quantity(Leg::Call)
    }

    pub fn pos_put(&self) -> Decimal {
        self.quantity(Leg::Put)
    }

    /// Unrealized P&L of a leg in quote currency
    pub fn pnl(&self, leg: Leg, price: Decimal) -> Decimal {
        match self.leg(leg) {
            Some(open) if open.quantity > Decimal::ZERO => {
                leg.pnl_per_unit(open.entry_price, price) * open.quantity
            }
            _ => Decimal::ZERO,
        }
    }

    /// Unrealized return fraction of a leg (0.01 = 1%)
    pub fn pnl_pct(&self, leg: Leg, price: Decimal) -> Decimal {
        match self.leg(leg) {
            Some(open) if open.quantity > Decimal::ZERO && !open.entry_price.is_zero() => {
                leg.pnl_per_unit(open.entry_price, price) / open.entry_price
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn pnl_call(&self, price: Decimal) -> Decimal {
        self.pnl(Leg::Call, price)
    }

    pub fn pnl_put(&self, price: Decimal) -> Decimal {
        self.pnl(Leg::Put, price)
    }

    pub fn pnl_pct_call(&self, price: Decimal) -> Decimal {
        self.pnl_pct(Leg::Call, price)
    }

    pub fn pnl_pct_put(&self, price: Decimal) -> Decimal {
        self.pnl_pct(Leg::Put, price)
    }

    /// Long + short P&L combined
    pub fn total_pnl(&self, price: Decimal) -> Decimal {
        self.pnl_call(price) + self.pnl_put(price)
    }

    /// Track the best price seen on each open leg
    pub fn update_favorable_price(&mut self, price: Decimal) {
        for leg in [Leg::Call, Leg::Put] {
            if let Some(open) = self.leg_mut(leg).as_mut() {
                if leg.is_more_favorable(price, open.max_favorable_price) {
                    open.max_favorable_price = price;
                }
            }
        }
    }
}

/// Hedge-mode position side on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

/// Outcome of an order request, reported in-band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_quantity: Decimal,
    pub avg_price: Decimal,
    pub error: Option<String>,
}

impl OrderResult {
    pub fn filled(order_id: impl Into<String>, filled_quantity: Decimal, avg_price: Decimal) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            filled_quantity,
            avg_price,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            filled_quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            error: Some(error.into()),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Exchange-reported position on one side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}
