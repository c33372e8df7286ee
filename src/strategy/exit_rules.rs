use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::StrategyConfig;
use crate::indicators::calculate_rsi_candles;
use crate::models::{Candle, Leg, OpenLeg, TradingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    TimeStop,
    TrailingStop,
    RsiRollover,
}

/// Which leg tripped which rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSignal {
    pub leg: Leg,
    pub reason: ExitReason,
}

/// Stateless exit checks for open legs
///
/// Per leg, first hit wins: take-profit, time-stop, trailing-stop, RSI
/// rollover. The long leg is checked before the short leg.
#[derive(Debug, Clone)]
pub struct ExitRuleEvaluator {
    take_profit_pct: Decimal,
    trailing_pct: Decimal,
    max_hold: Duration,
    rsi_length: usize,
}

impl ExitRuleEvaluator {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            take_profit_pct: config.take_profit_pct,
            trailing_pct: config.trailing_pct,
            max_hold: Duration::minutes(config.max_hold_minutes()),
            rsi_length: config.rsi_length,
        }
    }

    /// True as soon as either open leg satisfies any exit rule
    pub fn exit_rule_hit(
        &self,
        state: &TradingState,
        price: Decimal,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> bool {
        self.evaluate(state, price, candles, now).is_some()
    }

    /// First exit rule that fires, if any
    pub fn evaluate(
        &self,
        state: &TradingState,
        price: Decimal,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Option<ExitSignal> {
        [Leg::Call, Leg::Put].into_iter().find_map(|leg| {
            let open = state.leg(leg)?;
            if open.quantity <= Decimal::ZERO {
                return None;
            }
            let reason = self.check_leg(leg, open, price, candles, now)?;
            tracing::info!(
                "[EXIT-{}] {} {:?} at price {}",
                leg,
                state.symbol(),
                reason,
                price
            );
            Some(ExitSignal { leg, reason })
        })
    }

    fn check_leg(
        &self,
        leg: Leg,
        open: &OpenLeg,
        price: Decimal,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if open.entry_price.is_zero() {
            return None;
        }
        let pnl_pct = leg.pnl_per_unit(open.entry_price, price) / open.entry_price;

        // 1. Fixed take-profit
        if pnl_pct >= self.take_profit_pct {
            tracing::debug!("TP hit: {} >= {}", pnl_pct, self.take_profit_pct);
            return Some(ExitReason::TakeProfit);
        }

        // 2. Max hold time
        let held = now - open.entry_time;
        if held >= self.max_hold {
            tracing::debug!(
                "Time exceeded: {}min >= {}min",
                held.num_minutes(),
                self.max_hold.num_minutes()
            );
            return Some(ExitReason::TimeStop);
        }

        // 3. Trailing stop, armed once the excursion exceeds trailing_pct
        if pnl_pct > self.trailing_pct {
            let retraced = match leg {
                Leg::Call => price <= open.max_favorable_price * (Decimal::ONE - self.trailing_pct),
                Leg::Put => price >= open.max_favorable_price * (Decimal::ONE + self.trailing_pct),
            };
            if retraced {
                tracing::debug!(
                    "Trailing stop: price {} vs best {}",
                    price,
                    open.max_favorable_price
                );
                return Some(ExitReason::TrailingStop);
            }
        }

        // 4. RSI rollover out of the extreme zone
        if self.rsi_rolled_over(leg, candles) {
            return Some(ExitReason::RsiRollover);
        }

        None
    }

    fn rsi_rolled_over(&self, leg: Leg, candles: &[Candle]) -> bool {
        if candles.len() < 3 {
            return false;
        }
        let previous = calculate_rsi_candles(&candles[..candles.len() - 1], self.rsi_length);
        let current = calculate_rsi_candles(candles, self.rsi_length);

        let (rsi_prev, rsi_now) = match (previous, current) {
            (Ok(prev), Ok(now)) => (prev, now),
            _ => return false,
        };

        let rolled = match leg {
            Leg::Call => rsi_prev >= dec!(70) && rsi_now <= dec!(50),
            Leg::Put => rsi_prev <= dec!(30) && rsi_now >= dec!(50),
        };
        if rolled {
            tracing::debug!("RSI rollover: {} -> {}", rsi_prev, rsi_now);
        }
        rolled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> ExitRuleEvaluator {
        ExitRuleEvaluator::new(&StrategyConfig::default())
    }

    fn candles(closes: &[Decimal]) -> Vec<Candle> {
        let start = Utc::now() - Duration::minutes(5 * closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(1000),
            })
            .collect()
    }

    /// Closes rising 0.1 per bar: no rollover either way
    fn drifting_candles() -> Vec<Candle> {
        let closes: Vec<Decimal> = (0..10).map(|i| dec!(100) + dec!(0.1) * Decimal::from(i)).collect();
        candles(&closes)
    }

    fn state_with(leg: Leg, entry_price: Decimal, entry_time: DateTime<Utc>) -> TradingState {
        let mut state = TradingState::new("BTCUSDT");
        state.open_leg(
            leg,
            OpenLeg {
                quantity: dec!(1),
                entry_price,
                entry_time,
                max_favorable_price: entry_price,
            },
        );
        state
    }

    #[test]
    fn test_take_profit_exact_threshold() {
        let now = Utc::now();
        let state = state_with(Leg::Call, dec!(100), now);

        let signal = evaluator().evaluate(&state, dec!(101), &drifting_candles(), now);
        assert_eq!(
            signal,
            Some(ExitSignal { leg: Leg::Call, reason: ExitReason::TakeProfit })
        );
    }

    #[test]
    fn test_take_profit_short_leg() {
        let now = Utc::now();
        let state = state_with(Leg::Put, dec!(100), now);

        assert!(evaluator().exit_rule_hit(&state, dec!(99), &drifting_candles(), now));
        assert!(!evaluator().exit_rule_hit(&state, dec!(99.5), &drifting_candles(), now));
    }

    #[test]
    fn test_time_stop_exactly_at_max_hold() {
        let entry = Utc::now();
        let state = state_with(Leg::Call, dec!(100), entry);
        let now = entry + Duration::minutes(24 * 5);

        let signal = evaluator().evaluate(&state, dec!(100), &drifting_candles(), now);
        assert_eq!(signal.map(|s| s.reason), Some(ExitReason::TimeStop));

        let just_before = now - Duration::seconds(1);
        assert!(!evaluator().exit_rule_hit(&state, dec!(100), &drifting_candles(), just_before));
    }

    #[test]
    fn test_no_exit_below_thresholds() {
        let now = Utc::now();
        let state = state_with(Leg::Call, dec!(100), now);

        assert!(!evaluator().exit_rule_hit(&state, dec!(100.5), &drifting_candles(), now));
    }

    #[test]
    fn test_trailing_stop_long() {
        let now = Utc::now();
        let mut state = state_with(Leg::Call, dec!(100), now);
        state.update_favorable_price(dec!(100.9));

        // armed at +0.6%, but 100.6 is still above the trail at 100.9 * 0.995 = 100.3955
        assert!(!evaluator().exit_rule_hit(&state, dec!(100.6), &drifting_candles(), now));

        let config = StrategyConfig {
            trailing_pct: dec!(0.002),
            ..Default::default()
        };
        // trail at 100.9 * 0.998 = 100.6982
        let signal = ExitRuleEvaluator::new(&config).evaluate(&state, dec!(100.6), &drifting_candles(), now);
        assert_eq!(signal.map(|s| s.reason), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn test_trailing_stop_short() {
        let now = Utc::now();
        let mut state = state_with(Leg::Put, dec!(100), now);
        state.update_favorable_price(dec!(99.1));

        let config = StrategyConfig {
            trailing_pct: dec!(0.002),
            ..Default::default()
        };
        // arm: +0.6% > 0.2%, trail at 99.1 * 1.002 = 99.2982
        let signal = ExitRuleEvaluator::new(&config).evaluate(&state, dec!(99.4), &drifting_candles(), now);
        assert_eq!(signal, Some(ExitSignal { leg: Leg::Put, reason: ExitReason::TrailingStop }));
    }

    #[test]
    fn test_rsi_rollover_long() {
        let now = Utc::now();
        let state = state_with(Leg::Call, dec!(100), now);
        // rally then a sharp drop on the last bar
        let window = candles(&[dec!(100), dec!(101), dec!(102), dec!(103), dec!(99)]);

        let signal = evaluator().evaluate(&state, dec!(100), &window, now);
        assert_eq!(signal.map(|s| s.reason), Some(ExitReason::RsiRollover));
    }

    #[test]
    fn test_rsi_rollover_short() {
        let now = Utc::now();
        let state = state_with(Leg::Put, dec!(100), now);
        // selloff then a sharp bounce on the last bar
        let window = candles(&[dec!(103), dec!(102), dec!(101), dec!(100), dec!(104)]);

        let signal = evaluator().evaluate(&state, dec!(100), &window, now);
        assert_eq!(signal.map(|s| s.reason), Some(ExitReason::RsiRollover));
    }

    #[test]
    fn test_rollover_needs_three_candles() {
        let now = Utc::now();
        let state = state_with(Leg::Call, dec!(100), now);
        let window = candles(&[dec!(103), dec!(99)]);

        assert!(!evaluator().exit_rule_hit(&state, dec!(100), &window, now));
    }

    #[test]
    fn test_long_checked_before_short() {
        let now = Utc::now();
        let mut state = state_with(Leg::Call, dec!(100), now);
        state.open_leg(
            Leg::Put,
            OpenLeg {
                quantity: dec!(1),
                entry_price: dec!(110),
                entry_time: now,
                max_favorable_price: dec!(110),
            },
        );

        // both legs are past take-profit at 105
        let signal = evaluator().evaluate(&state, dec!(105), &drifting_candles(), now);
        assert_eq!(signal.map(|s| s.leg), Some(Leg::Call));
    }

    #[test]
    fn test_flat_state_never_exits() {
        let state = TradingState::new("BTCUSDT");
        assert!(!evaluator().exit_rule_hit(&state, dec!(1), &drifting_candles(), Utc::now()));
    }
}
