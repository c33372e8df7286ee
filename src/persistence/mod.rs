//! Durable per-symbol trading state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::HedgeError;
use crate::models::TradingState;
use crate::Result;

/// Storage for the `symbol -> TradingState` map
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Everything persisted so far; an unreadable store yields an empty map
    async fn load_all(&self) -> HashMap<String, TradingState>;

    /// Persist one symbol, leaving the others untouched
    async fn save(&self, symbol: &str, state: &TradingState) -> Result<()>;

    /// Replace the stored map
    async fn save_all(&self, states: &HashMap<String, TradingState>) -> Result<()>;
}

/// Single pretty-printed JSON file holding every symbol's state
pub struct JsonStateRepository {
    path: PathBuf,
    // serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl JsonStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> HashMap<String, TradingState> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting fresh", self.path.display());
                return HashMap::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read state file {}: {}", self.path.display(), e);
                return HashMap::new();
            }
        };

        if content.trim().is_empty() {
            return HashMap::new();
        }

        match serde_json::from_str(&content) {
            Ok(states) => states,
            Err(e) => {
                tracing::warn!(
                    "Corrupt state file {}, ignoring its contents: {}",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    async fn write_map(&self, states: &HashMap<String, TradingState>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(states)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            HedgeError::Persistence(format!("writing {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl StateRepository for JsonStateRepository {
    async fn load_all(&self) -> HashMap<String, TradingState> {
        let _guard = self.lock.lock().await;
        let states = self.read_map().await;
        tracing::debug!("Loaded {} symbol states from {}", states.len(), self.path.display());
        states
    }

    async fn save(&self, symbol: &str, state: &TradingState) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut states = self.read_map().await;
        states.insert(symbol.to_string(), state.clone());
        self.write_map(&states).await
    }

    async fn save_all(&self, states: &HashMap<String, TradingState>) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_map(states).await?;
        tracing::info!("💾 Saved {} symbol states to {}", states.len(), self.path.display());
        Ok(())
    }
}
