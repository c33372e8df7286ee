//! Daily regime classifier
//!
//! Compares RSI(rsi_length) of daily closes against the MACD(1,1,1) line:
//! - RSI > MACD → UP
//! - otherwise → DOWN
//!
//! MACD(1,1,1) is always zero, so in practice any net gain over the RSI
//! window keeps the regime UP and only a window with no gains turns it DOWN.

use rust_decimal::Decimal;

use crate::indicators::{calculate_macd_line_candles, calculate_rsi_candles};
use crate::models::{Candle, Regime};
use crate::Result;

/// Indicator values behind a classification, kept for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReading {
    pub rsi: Decimal,
    pub macd: Decimal,
    pub regime: Regime,
}

#[derive(Debug, Clone)]
pub struct RegimeDetector {
    rsi_length: usize,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self { rsi_length: 2 }
    }
}

impl RegimeDetector {
    pub fn new(rsi_length: usize) -> Self {
        Self { rsi_length }
    }

    /// Classify the regime from daily candles (oldest first)
    pub fn detect_regime(&self, candles: &[Candle]) -> Result<RegimeReading> {
        let rsi = calculate_rsi_candles(candles, self.rsi_length)?;
        let macd = calculate_macd_line_candles(candles, 1, 1, 1)?;

        let regime = if rsi > macd { Regime::Up } else { Regime::Down };

        Ok(RegimeReading { rsi, macd, regime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HedgeError;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn create_test_candles(closes: &[Decimal]) -> Vec<Candle> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(1000),
            })
            .collect()
    }

    #[test]
    fn test_detect_up_on_rally() {
        let candles = create_test_candles(&[dec!(100), dec!(98), dec!(101), dec!(104)]);
        let reading = RegimeDetector::default().detect_regime(&candles).unwrap();
        assert_eq!(reading.regime, Regime::Up);
        assert_eq!(reading.macd, Decimal::ZERO);
        assert!(reading.rsi > Decimal::ZERO);
    }

    #[test]
    fn test_detect_down_on_steady_decline() {
        let candles = create_test_candles(&[dec!(110), dec!(108), dec!(105), dec!(101)]);
        let reading = RegimeDetector::default().detect_regime(&candles).unwrap();
        assert_eq!(reading.rsi, Decimal::ZERO);
        assert_eq!(reading.regime, Regime::Down);
    }

    #[test]
    fn test_detect_insufficient_history() {
        let candles = create_test_candles(&[dec!(100), dec!(101)]);
        let err = RegimeDetector::new(2).detect_regime(&candles).unwrap_err();
        assert!(matches!(err, HedgeError::InsufficientData { .. }));
    }
}
