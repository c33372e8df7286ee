//! Strategy configuration.

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::HedgeError;
use crate::Result;

/// Environment variable prefix (`HEDGE_API_KEY`, `HEDGE_SYMBOLS`, ...)
pub const ENV_PREFIX: &str = "HEDGE";

/// Process-wide strategy parameters, read-only once validated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Notional size per entry (USDT)
    pub call_size: Decimal,

    /// RSI lookback
    pub rsi_length: usize,

    /// Fixed take-profit fraction (0.01 = 1%)
    pub take_profit_pct: Decimal,

    /// Trailing-stop fraction, also the excursion that arms it
    pub trailing_pct: Decimal,

    /// Max hold in 5-minute bars (24 = 2 hours)
    pub max_hold_bars: u32,

    /// Hedge alert level, must be negative
    pub hedge_loss_pct: Decimal,

    /// Symbols to track
    pub symbols: Vec<String>,

    pub use_testnet: bool,
    pub api_key: String,
    pub api_secret: String,

    /// JSON file holding per-symbol state
    pub state_file_path: String,

    /// Daily candles fetched per regime update
    pub daily_candle_limit: usize,

    /// 5-minute candles fetched per intraday update
    pub intraday_candle_limit: usize,

    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            call_size: dec!(10),
            rsi_length: 2,
            take_profit_pct: dec!(0.01),
            trailing_pct: dec!(0.005),
            max_hold_bars: 24,
            hedge_loss_pct: dec!(-0.01),
            symbols: vec!["DOGEUSDT".to_string(), "ALGOUSDT".to_string()],
            use_testnet: true,
            api_key: String::new(),
            api_secret: String::new(),
            state_file_path: "state.json".to_string(),
            daily_candle_limit: 30,
            intraday_candle_limit: 50,
            poll_interval_secs: 300,
        }
    }
}

impl StrategyConfig {
    /// Load from an optional TOML file, then `HEDGE_*` environment overrides
    ///
    /// Missing keys fall back to defaults. The result is not validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject the whole configuration on the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.call_size <= Decimal::ZERO {
            return Err(invalid("call_size must be greater than 0"));
        }
        if self.rsi_length == 0 {
            return Err(invalid("rsi_length must be greater than 0"));
        }
        if self.take_profit_pct <= Decimal::ZERO {
            return Err(invalid("take_profit_pct must be greater than 0"));
        }
        if self.trailing_pct <= Decimal::ZERO {
            return Err(invalid("trailing_pct must be greater than 0"));
        }
        if self.max_hold_bars == 0 {
            return Err(invalid("max_hold_bars must be greater than 0"));
        }
        if self.hedge_loss_pct >= Decimal::ZERO {
            return Err(invalid("hedge_loss_pct must be negative"));
        }
        if self.symbols.is_empty() {
            return Err(invalid("symbols list cannot be empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(invalid("api_key cannot be empty"));
        }
        if self.api_secret.trim().is_empty() {
            return Err(invalid("api_secret cannot be empty"));
        }
        Ok(())
    }

    /// Time-stop horizon in minutes
    pub fn max_hold_minutes(&self) -> i64 {
        i64::from(self.max_hold_bars) * 5
    }
}

fn invalid(message: &str) -> HedgeError {
    HedgeError::Configuration(message.to_string())
}
