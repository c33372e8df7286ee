use rust_decimal::Decimal;

use crate::error::HedgeError;
use crate::Result;

fn check_window(prices: &[Decimal], period: usize) -> Result<()> {
    if period == 0 {
        return Err(HedgeError::Configuration(
            "moving average period must be greater than 0".to_string(),
        ));
    }
    if prices.len() < period {
        return Err(HedgeError::InsufficientData {
            needed: period,
            got: prices.len(),
        });
    }
    Ok(())
}

/// Calculate Simple Moving Average (SMA) of the most recent `period` prices
pub fn calculate_sma(prices: &[Decimal], period: usize) -> Result<Decimal> {
    check_window(prices, period)?;

    let sum: Decimal = prices.iter().rev().take(period).sum();
    Ok(sum / Decimal::from(period as u64))
}

/// Calculate Exponential Moving Average (EMA)
///
/// Seeds with the SMA of the first `period` prices, then applies
/// multiplier `2 / (period + 1)` over the rest.
pub fn calculate_ema(prices: &[Decimal], period: usize) -> Result<Decimal> {
    check_window(prices, period)?;

    let multiplier = Decimal::TWO / Decimal::from(period as u64 + 1);

    // Start with SMA
    let mut ema = calculate_sma(&prices[..period], period)?;

    for price in &prices[period..] {
        ema = *price * multiplier + ema * (Decimal::ONE - multiplier);
    }

    Ok(ema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma() {
        let prices = vec![dec!(100), dec!(102), dec!(104), dec!(106), dec!(108)];
        assert_eq!(calculate_sma(&prices, 5).unwrap(), dec!(104));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![dec!(100), dec!(102)];
        assert!(calculate_sma(&prices, 5).is_err());
    }

    #[test]
    fn test_ema() {
        let prices = vec![dec!(100), dec!(102), dec!(104), dec!(106), dec!(108), dec!(110)];
        let ema = calculate_ema(&prices, 5).unwrap();
        // seed 104, then 110 * 1/3 + 104 * 2/3
        assert_eq!(ema.round_dp(10), dec!(106));
        assert!(ema > dec!(104)); // EMA should be above initial SMA
    }

    #[test]
    fn test_ema_period_one_is_last_price() {
        let prices = vec![dec!(3.5), dec!(9), dec!(4.25)];
        assert_eq!(calculate_ema(&prices, 1).unwrap(), dec!(4.25));
    }
}
