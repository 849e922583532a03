//! 前後端共用的資料格式
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppResult;

/// Counter value before any room metadata has been observed.
pub const UNKNOWN_COUNTER: i64 = -1;

/* ------------ 房間 metadata ------------ */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomMetadata {
    pub counter: i64,
}

impl RoomMetadata {
    pub fn parse(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Wire form, e.g. `{"counter":3}`.
    pub fn encode(&self) -> String {
        json!({ "counter": self.counter }).to_string()
    }

    pub fn incremented(self) -> Self {
        Self { counter: self.counter + 1 }
    }
}

/* ------------ REST payloads ------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCredentials {
    pub room_name: String,
    pub token:     String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterIncrementRequest {
    pub room_name: String,
}

/* ------------ room hub → participant ------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    Joined { room: String, metadata: Option<String> },
    MetadataChanged { metadata: String },
}

impl SignalMessage {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/* ------------ 連線狀態 ------------ */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    AwaitingCredentials,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    /// Credential request failed; nothing retries it.
    Failed,
}
