// Order execution and market data collaborators
pub mod paper;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::HedgeError;
use crate::models::{Candle, OrderResult, PositionInfo, PositionSide};
use crate::Result;

pub use paper::PaperExchange;

/// Kline interval accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
    ThreeDays,
    OneWeek,
    OneMonth,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = HedgeError;

    // "1M" (month) and "1m" (minute) differ only by case
    fn from_str(s: &str) -> Result<Self> {
        let interval = match s {
            "1M" => Interval::OneMonth,
            other => match other.to_lowercase().as_str() {
                "1m" => Interval::OneMinute,
                "3m" => Interval::ThreeMinutes,
                "5m" => Interval::FiveMinutes,
                "15m" => Interval::FifteenMinutes,
                "30m" => Interval::ThirtyMinutes,
                "1h" => Interval::OneHour,
                "2h" => Interval::TwoHours,
                "4h" => Interval::FourHours,
                "6h" => Interval::SixHours,
                "8h" => Interval::EightHours,
                "12h" => Interval::TwelveHours,
                "1d" => Interval::OneDay,
                "3d" => Interval::ThreeDays,
                "1w" => Interval::OneWeek,
                _ => {
                    return Err(HedgeError::Configuration(format!(
                        "unknown interval: {}",
                        s
                    )))
                }
            },
        };
        Ok(interval)
    }
}

/// Order execution and market data, hedge-mode futures semantics
///
/// Order calls never fail out-of-band: failures come back as
/// `OrderResult { success: false, .. }`.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal>;

    /// Most recent `limit` candles, oldest first
    async fn get_candles(&self, symbol: &str, interval: Interval, limit: usize)
        -> Result<Vec<Candle>>;

    /// Open a long leg worth `notional` quote currency
    async fn open_long(&self, symbol: &str, notional: Decimal) -> OrderResult;

    async fn close_long(&self, symbol: &str, quantity: Decimal) -> OrderResult;

    /// Open a short leg worth `notional` quote currency
    async fn open_short(&self, symbol: &str, notional: Decimal) -> OrderResult;

    async fn close_short(&self, symbol: &str, quantity: Decimal) -> OrderResult;

    async fn get_position(&self, symbol: &str, side: PositionSide) -> Result<PositionInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parsing() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::FiveMinutes);
        assert_eq!("1D".parse::<Interval>().unwrap(), Interval::OneDay);
        assert_eq!("1M".parse::<Interval>().unwrap(), Interval::OneMonth);
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::OneMinute);
        assert!("7m".parse::<Interval>().is_err());
        assert_eq!(Interval::TwelveHours.to_string(), "12h");
    }
}
