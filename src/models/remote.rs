//! Records returned by the control-plane HTTP API to the CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of `GET /api/bots`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotRecord {
    /// Control-plane identifier (numeric in practice).
    pub id: Value,
    /// Worker name.
    pub name: String,
    /// Last reported status.
    #[serde(default)]
    pub status: Option<String>,
    /// Timestamp of the last ping, if any.
    #[serde(default)]
    pub last_ping: Option<String>,
    /// Process id, when known upstream.
    #[serde(default)]
    pub pid: Option<Value>,
    /// Declared entry-point file.
    #[serde(default)]
    pub main_file: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl BotRecord {
    /// Identifier rendered for URL paths (`42`, not `"42"`).
    #[must_use]
    pub fn id_segment(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Response body of `POST /api/bot/{id}/control`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlReply {
    /// Whether the control plane accepted the command.
    #[serde(default)]
    pub success: bool,
    /// Human-readable confirmation.
    #[serde(default)]
    pub message: Option<String>,
    /// Error text on failure.
    #[serde(default)]
    pub error: Option<String>,
}
