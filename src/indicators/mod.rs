// Technical indicators module
// RSI (Wilder) and the simplified MACD line that drive regime and entry signals

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{calculate_macd_line, calculate_macd_line_candles};
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::{calculate_rsi, calculate_rsi_candles};
