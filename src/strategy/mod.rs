// Decision logic: signals, exit rules and the regime/hedge engine
pub mod exit_rules;
pub mod hedge;
pub mod signals;

pub use exit_rules::{ExitReason, ExitRuleEvaluator, ExitSignal};
pub use hedge::HedgeStrategy;
pub use signals::{generate_signals, signal_long, signal_short, Signals};
