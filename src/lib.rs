// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod regime;
pub mod strategy;

// Re-export commonly used types
pub use config::StrategyConfig;
pub use error::HedgeError;
pub use execution::{Exchange, Interval, PaperExchange};
pub use models::*;
pub use persistence::{JsonStateRepository, StateRepository};
pub use strategy::HedgeStrategy;

// Error handling
pub type Result<T> = std::result::Result<T, HedgeError>;
