//! The agent message envelope exchanged between the architect, coders, and
//! the standalone CLI driver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MsgType {
    Story,
    Request,
    Result,
    Answer,
}

/// A message passed between agents (or between the CLI and an agent).
///
/// `payload` is an open map rather than a fixed struct because different
/// message types carry different keys (`content`, `status`,
/// `request_type`, ...); the FSM reads only the keys it understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMsg {
    #[serde(rename = "type")]
    pub msg_type: MsgType,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
}

impl AgentMsg {
    pub fn new(msg_type: MsgType, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            msg_type,
            from: from.into(),
            to: to.into(),
            payload: HashMap::new(),
        }
    }

    pub fn set_payload(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn get_payload(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
