use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::HedgeError;
use crate::models::Candle;
use crate::Result;

/// Calculate Relative Strength Index (RSI) with Wilder smoothing
///
/// The first `period` gains/losses seed simple averages; every later
/// change is folded in as `avg = (avg * (period - 1) + value) / period`.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
/// - No losses in the window: exactly 100
///
pub fn calculate_rsi(prices: &[Decimal], period: usize) -> Result<Decimal> {
    if period == 0 {
        return Err(HedgeError::Configuration(
            "RSI period must be greater than 0".to_string(),
        ));
    }
    if prices.len() < period + 1 {
        return Err(HedgeError::InsufficientData {
            needed: period + 1,
            got: prices.len(),
        });
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for window in prices.windows(2) {
        let change = window[1] - window[0];
        if change > Decimal::ZERO {
            gains.push(change);
            losses.push(Decimal::ZERO);
        } else {
            gains.push(Decimal::ZERO);
            losses.push(change.abs());
        }
    }

    let n = Decimal::from(period as u64);
    let mut avg_gain: Decimal = gains[..period].iter().sum::<Decimal>() / n;
    let mut avg_loss: Decimal = losses[..period].iter().sum::<Decimal>() / n;

    let carry = n - Decimal::ONE;
    for (gain, loss) in gains[period..].iter().zip(&losses[period..]) {
        avg_gain = (avg_gain * carry + *gain) / n;
        avg_loss = (avg_loss * carry + *loss) / n;
    }

    if avg_loss.is_zero() {
        return Ok(dec!(100));
    }

    let rs = avg_gain / avg_loss;
    Ok(dec!(100) - dec!(100) / (Decimal::ONE + rs))
}

/// RSI over candle closes
pub fn calculate_rsi_candles(candles: &[Candle], period: usize) -> Result<Decimal> {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    calculate_rsi(&closes, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[&str]) -> Vec<Decimal> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    #[test]
    fn test_rsi_calculation() {
        let prices = prices(&["44.0", "44.34", "44.09", "43.61", "44.33", "44.83"]);

        let rsi = calculate_rsi(&prices, 2).unwrap();
        assert!(rsi >= Decimal::ZERO && rsi <= dec!(100));
    }

    #[test]
    fn test_rsi_known_value() {
        // changes: +2, -1, +2 -> seed gain 1, loss 0.5; then gain (1 + 2) / 2 = 1.5, loss 0.25
        let prices = prices(&["10.0", "12.0", "11.0", "13.0"]);

        let rsi = calculate_rsi(&prices, 2).unwrap();
        // rs = 6 -> 100 - 100 / 7
        assert_eq!(rsi.round_dp(6), dec!(85.714286));
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = prices(&["100.0"]);
        let err = calculate_rsi(&prices, 2).unwrap_err();
        assert!(matches!(err, HedgeError::InsufficientData { needed: 3, got: 1 }));
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = prices(&["100.0", "101.0", "102.0", "103.0", "104.0", "105.0"]);
        let rsi = calculate_rsi(&prices, 2).unwrap();
        assert_eq!(rsi, dec!(100)); // No losses = RSI 100
    }

    #[test]
    fn test_rsi_downtrend_is_low() {
        let prices = prices(&["105.0", "104.0", "103.0", "102.0", "101.0", "100.0"]);
        let rsi = calculate_rsi(&prices, 2).unwrap();
        assert!(rsi < dec!(50), "downtrend RSI should be below 50, got {}", rsi);
        assert_eq!(rsi, Decimal::ZERO);
    }

    #[test]
    fn test_rsi_stays_in_bounds() {
        let series = [
            prices(&["1.0", "3.0", "2.0", "5.0", "4.0", "4.0", "7.0"]),
            prices(&["50.0", "49.5", "51.25", "48.0", "48.0", "47.9"]),
            prices(&["0.1", "0.1", "0.1"]),
        ];
        for s in &series {
            for period in 1..s.len() {
                let rsi = calculate_rsi(s, period).unwrap();
                assert!(rsi >= Decimal::ZERO && rsi <= dec!(100), "rsi {} out of range", rsi);
            }
        }
    }

    #[test]
    fn test_rsi_zero_period_rejected() {
        let prices = prices(&["1.0", "2.0"]);
        assert!(calculate_rsi(&prices, 0).is_err());
    }
}
