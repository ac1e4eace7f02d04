//! Inbound control commands and outbound reports on the persistent channel.
//!
//! Inbound payloads are decoded here, at the channel boundary, into the
//! closed [`ControlCommand`] type. Anything the supervisor cannot act on
//! (missing fields, unknown actions) is rejected before it reaches the
//! registry.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::host::HostStatus;
use super::worker::ControlAction;
use crate::{AppError, Result};

/// Inbound event name for worker lifecycle commands.
pub const EVENT_BOT_CONTROL: &str = "botControl";
/// Inbound event name for artifact update signals.
pub const EVENT_FILE_UPDATE: &str = "fileUpdate";

/// A command delivered by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Apply a lifecycle action to a named worker.
    Worker {
        /// Registered worker name.
        name: String,
        /// Requested action.
        action: ControlAction,
    },
    /// Pull the artifact set of the worker with this control-plane id.
    FileUpdate {
        /// Control-plane worker identifier.
        bot_id: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotControlPayload {
    bot_name: Option<String>,
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileUpdatePayload {
    bot_id: Option<Value>,
}

impl ControlCommand {
    /// Decode an inbound event into a command.
    ///
    /// Returns `Ok(None)` for events the supervisor does not handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` for malformed payloads and
    /// `AppError::UnsupportedAction` for actions outside start/stop/restart.
    pub fn decode(event: &str, payload: Value) -> Result<Option<Self>> {
        match event {
            EVENT_BOT_CONTROL => {
                let body: BotControlPayload = serde_json::from_value(payload)
                    .map_err(|err| AppError::Channel(format!("malformed botControl: {err}")))?;
                let (Some(name), Some(action)) = (body.bot_name, body.action) else {
                    return Err(AppError::Channel(
                        "botControl requires botName and action".into(),
                    ));
                };
                if name.is_empty() {
                    return Err(AppError::Channel("botControl botName is empty".into()));
                }
                Ok(Some(Self::Worker {
                    name,
                    action: action.parse()?,
                }))
            }
            EVENT_FILE_UPDATE => {
                let body: FileUpdatePayload = serde_json::from_value(payload)
                    .map_err(|err| AppError::Channel(format!("malformed fileUpdate: {err}")))?;
                let bot_id = match body.bot_id {
                    Some(Value::String(id)) if !id.is_empty() => id,
                    Some(Value::Number(id)) => id.to_string(),
                    _ => {
                        return Err(AppError::Channel(
                            "fileUpdate requires a string or numeric botId".into(),
                        ))
                    }
                };
                Ok(Some(Self::FileUpdate { bot_id }))
            }
            _ => Ok(None),
        }
    }
}

/// A report published to the control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Host identity announcement sent on every (re)connect.
    Register {
        /// Host display name.
        name: String,
    },
    /// Periodic host health report.
    Heartbeat(HostStatus),
    /// A crashed worker was found and auto-restarted.
    BotCrashed {
        /// Worker name.
        bot_name: String,
        /// When the crash was handled.
        timestamp: DateTime<Utc>,
    },
}

impl OutboundEvent {
    /// Event name on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Heartbeat(_) => "raspberry_heartbeat",
            Self::BotCrashed { .. } => "bot_crashed",
        }
    }

    /// Event payload on the wire.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Register { name } => json!({ "type": "raspberry", "name": name }),
            Self::Heartbeat(status) => serde_json::to_value(status).unwrap_or(Value::Null),
            Self::BotCrashed {
                bot_name,
                timestamp,
            } => json!({
                "botName": bot_name,
                "action": "auto_restart",
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }
}
