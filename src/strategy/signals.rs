use crate::indicators::{calculate_macd_line_candles, calculate_rsi_candles};
use crate::models::Candle;
use crate::Result;

/// Entry/exit signals for one 5-minute candle window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub long: bool,
    pub short: bool,
}

/// Long signal: RSI(rsi_len) above the MACD(1,1,1) line
///
/// With the zero baseline this fires whenever the window shows any gain.
pub fn signal_long(candles: &[Candle], rsi_len: usize) -> Result<bool> {
    let rsi = calculate_rsi_candles(candles, rsi_len)?;
    let macd = calculate_macd_line_candles(candles, 1, 1, 1)?;
    Ok(rsi > macd)
}

/// Short signal: RSI(rsi_len) below the MACD(1,1,1) line
///
/// RSI never drops below 0 and MACD(1,1,1) is always 0, so this stays
/// false for every window. Kept as the mirror of `signal_long` on purpose.
pub fn signal_short(candles: &[Candle], rsi_len: usize) -> Result<bool> {
    let rsi = calculate_rsi_candles(candles, rsi_len)?;
    let macd = calculate_macd_line_candles(candles, 1, 1, 1)?;
    Ok(rsi < macd)
}

/// Both signals for a window; too short a window yields no signal
pub fn generate_signals(candles: &[Candle], rsi_len: usize) -> Signals {
    if candles.len() < rsi_len + 1 {
        tracing::debug!(
            "Signal window too short: {} candles, need {}",
            candles.len(),
            rsi_len + 1
        );
        return Signals::default();
    }

    Signals {
        long: signal_long(candles, rsi_len).unwrap_or(false),
        short: signal_short(candles, rsi_len).unwrap_or(false),
    }
}

/// Validate that candles are sorted and uniformly spaced in time
///
/// Allows up to 1.5x the expected interval (e.g., 7.5 min for 5 min candles)
pub fn validate_candle_uniformity(
    candles: &[Candle],
    expected_interval_secs: u64,
) -> anyhow::Result<()> {
    if candles.len() < 2 {
        return Ok(());
    }

    // Allow 50% tolerance for slight timing variations
    let max_gap_secs = expected_interval_secs + (expected_interval_secs / 2);

    for window in candles.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff < 0 {
            anyhow::bail!("Candles are not sorted by open time");
        }

        if time_diff as u64 > max_gap_secs {
            anyhow::bail!(
                "Data gap detected: {}s between candles (expected ~{}s, max allowed {}s). Gap from {} to {}",
                time_diff,
                expected_interval_secs,
                max_gap_secs,
                window[0].open_time.format("%H:%M:%S"),
                window[1].open_time.format("%H:%M:%S")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candles_from(closes: impl IntoIterator<Item = Decimal>) -> Vec<Candle> {
        let start = Utc::now();
        closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close + dec!(0.5),
                low: close - dec!(0.5),
                close,
                volume: dec!(1000),
            })
            .collect()
    }

    #[test]
    fn test_signal_long_on_uptrend() {
        let candles = candles_from((0..10).map(|i| dec!(100) + Decimal::from(i * 2)));
        assert!(signal_long(&candles, 2).unwrap());
    }

    #[test]
    fn test_signal_long_false_on_pure_decline() {
        let candles = candles_from((0..10).map(|i| dec!(100) - Decimal::from(i * 2)));
        assert!(!signal_long(&candles, 2).unwrap());
    }

    #[test]
    fn test_signal_short_is_always_false() {
        let windows = vec![
            candles_from((0..10).map(|i| dec!(100) - Decimal::from(i * 2))),
            candles_from((0..10).map(|i| dec!(100) + Decimal::from(i * 2))),
            candles_from(vec![dec!(5), dec!(9), dec!(1), dec!(4)]),
            candles_from(vec![dec!(1)]),
        ];
        for candles in &windows {
            assert!(!signal_short(candles, 0).unwrap_or(false));
            assert!(!signal_short(candles, 1).unwrap_or(false));
            assert!(!generate_signals(candles, 2).short);
        }
    }

    #[test]
    fn test_generate_signals_short_window() {
        let candles = candles_from(vec![dec!(100), dec!(101)]);
        assert_eq!(generate_signals(&candles, 2), Signals::default());
    }

    #[test]
    fn test_validate_candle_uniformity() {
        let candles = candles_from(vec![dec!(1), dec!(2), dec!(3)]);
        assert!(validate_candle_uniformity(&candles, 300).is_ok());

        let mut gapped = candles.clone();
        gapped[2].open_time = gapped[1].open_time + Duration::minutes(20);
        assert!(validate_candle_uniformity(&gapped, 300).is_err());

        let mut unsorted = candles;
        unsorted.swap(0, 2);
        assert!(validate_candle_uniformity(&unsorted, 300).is_err());
    }
}
