//! Socket.IO v4 framing over Engine.IO v4 WebSocket text frames.
//!
//! Only the subset the supervisor needs is handled: the engine open,
//! ping/pong and close packets, and the socket connect, disconnect,
//! connect-error and event packets on the default namespace.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                    engine ping / pong
//! 40                                                       socket connect
//! 42["botControl",{"botName":"echo","action":"start"}]     socket event
//! ```

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppError, Result};

/// Engine pong, sent in reply to every server ping.
pub const PONG: &str = "3";
/// Socket connect request for the default namespace.
pub const CONNECT: &str = "40";
/// Socket disconnect for the default namespace.
pub const DISCONNECT: &str = "41";

/// Parameters announced by the server in the engine open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    /// Engine session id.
    pub sid: String,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenHandshake {
    /// How long to wait for the next server ping before declaring the
    /// connection dead.
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine open handshake.
    Open(OpenHandshake),
    /// Engine close.
    Close,
    /// Engine ping from the server.
    Ping,
    /// Engine pong.
    Pong,
    /// Namespace connect acknowledged.
    Connected,
    /// Namespace disconnected by the server.
    Disconnected,
    /// Namespace connect refused.
    ConnectError(String),
    /// Named event with its first argument.
    Event {
        /// Event name.
        name: String,
        /// First event argument, `null` when absent.
        payload: Value,
    },
    /// Anything else (upgrade, noop, binary events, acks).
    Ignored,
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns `AppError::Channel` for empty frames and malformed JSON bodies.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let engine = chars
        .next()
        .ok_or_else(|| AppError::Channel("empty frame".into()))?;
    let rest = chars.as_str();

    match engine {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|err| AppError::Channel(format!("malformed open packet: {err}"))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest),
        _ => Ok(Packet::Ignored),
    }
}

fn decode_socket(body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let Some(kind) = chars.next() else {
        return Ok(Packet::Ignored);
    };
    let rest = strip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connected),
        '1' => Ok(Packet::Disconnected),
        '4' => Ok(Packet::ConnectError(rest.to_owned())),
        '2' => decode_event(rest.trim_start_matches(|c: char| c.is_ascii_digit())),
        _ => Ok(Packet::Ignored),
    }
}

/// Drop a `/namespace,` prefix if present.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, tail)| tail)
    } else {
        body
    }
}

fn decode_event(body: &str) -> Result<Packet> {
    let args: Vec<Value> = serde_json::from_str(body)
        .map_err(|err| AppError::Channel(format!("malformed event packet: {err}")))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(AppError::Channel("event packet without a name".into())),
    };
    Ok(Packet::Event {
        name,
        payload: args.next().unwrap_or(Value::Null),
    })
}

/// Encode a named event for the default namespace.
#[must_use]
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", json!([name, payload]))
}

/// Derive the WebSocket endpoint from the control-plane base URL.
///
/// # Errors
///
/// Returns `AppError::Config` if the base URL is not an http(s) URL.
pub fn channel_url(base: &str) -> Result<String> {
    let mut url =
        Url::parse(base).map_err(|err| AppError::Config(format!("invalid server url: {err}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(AppError::Config(format!(
                "unsupported server url scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| AppError::Config(format!("cannot use {scheme} for {base}")))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}
