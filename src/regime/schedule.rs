//! Per-symbol bookkeeping of the last UTC day a regime was classified.
//!
//! A symbol only counts as refreshed once its daily update produced a
//! regime, so a failed candle fetch or a short history is retried on the
//! next cycle instead of waiting for the next day.

use std::collections::HashMap;

use chrono::NaiveDate;

#[derive(Debug, Default, Clone)]
pub struct DailySchedule {
    last_refresh: HashMap<String, NaiveDate>,
}

impl DailySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_due(&self, symbol: &str, today: NaiveDate) -> bool {
        self.last_refresh.get(symbol) != Some(&today)
    }

    pub fn mark_refreshed(&mut self, symbol: &str, today: NaiveDate) {
        self.last_refresh.insert(symbol.to_string(), today);
    }
}
