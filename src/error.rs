use thiserror::Error;

/// Errors raised by the decision engine and its collaborators
#[derive(Debug, Error)]
pub enum HedgeError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("insufficient data: need {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
