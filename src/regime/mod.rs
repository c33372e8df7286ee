// Market regime detection module
pub mod detector;
pub mod schedule;

pub use detector::{RegimeDetector, RegimeReading};
pub use schedule::DailySchedule;
