use rust_decimal::Decimal;

use super::moving_average::calculate_ema;
use crate::error::HedgeError;
use crate::models::Candle;
use crate::Result;

/// MACD line only: `EMA(fast) - EMA(slow)`
///
/// `_signal` is accepted so callers can pass the usual triple; no signal
/// line is computed. With `fast == slow` the result is always zero, which
/// the strategy uses as a fixed zero baseline (MACD(1,1,1)).
pub fn calculate_macd_line(
    prices: &[Decimal],
    fast: usize,
    slow: usize,
    _signal: usize,
) -> Result<Decimal> {
    let needed = fast.max(slow);
    if prices.len() < needed {
        return Err(HedgeError::InsufficientData {
            needed,
            got: prices.len(),
        });
    }

    let ema_fast = calculate_ema(prices, fast)?;
    let ema_slow = calculate_ema(prices, slow)?;

    Ok(ema_fast - ema_slow)
}

/// MACD line over candle closes
pub fn calculate_macd_line_candles(
    candles: &[Candle],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Decimal> {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    calculate_macd_line(&closes, fast, slow, signal)
}
