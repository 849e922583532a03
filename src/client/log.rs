use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

/// Append-only page log; every entry is mirrored to tracing.
#[derive(Clone, Default)]
pub struct MessageLog(Arc<RwLock<Vec<String>>>);

impl MessageLog {
    pub async fn info(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{msg}");
        self.0.write().await.push(format!("log: {msg}"));
    }

    pub async fn error(&self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("{msg}");
        self.0.write().await.push(format!("error: {msg}"));
    }

    pub async fn entries(&self) -> Vec<String> {
        self.0.read().await.clone()
    }

    #[cfg(test)]
    pub async fn contains(&self, needle: &str) -> bool {
        self.0.read().await.iter().any(|e| e.contains(needle))
    }
}
