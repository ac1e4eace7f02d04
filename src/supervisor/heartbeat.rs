//! Heartbeat loop.
//!
//! Each tick builds a host snapshot and reports it over the persistent
//! channel, falling back to the HTTP endpoint when the channel is down or
//! the emit fails. A failed heartbeat is logged and retried on the next
//! tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::Uplink;
use crate::models::command::OutboundEvent;
use crate::models::host::HostStatus;
use crate::supervisor::Supervisor;
use crate::Result;

/// Path a heartbeat was delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatRoute {
    /// Persistent channel.
    Channel,
    /// One-shot HTTP fallback.
    Http,
}

/// Deliver one heartbeat, preferring the persistent channel.
///
/// # Errors
///
/// Returns the HTTP fallback's error when neither route delivered.
pub async fn send_heartbeat(uplink: &dyn Uplink, status: HostStatus) -> Result<HeartbeatRoute> {
    if uplink.is_connected() {
        match uplink.emit(OutboundEvent::Heartbeat(status.clone())).await {
            Ok(()) => return Ok(HeartbeatRoute::Channel),
            Err(err) => debug!(%err, "channel heartbeat failed; using http"),
        }
    }
    uplink.post_heartbeat(&status).await?;
    Ok(HeartbeatRoute::Http)
}

/// Spawn the heartbeat loop with the given period.
#[must_use]
pub fn spawn_heartbeat(supervisor: Arc<Supervisor>, interval: Duration) -> JoinHandle<()> {
    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        info!(?interval, "heartbeat loop started");
        loop {
            let status = supervisor.host_snapshot().await;
            match send_heartbeat(&**supervisor.uplink(), status).await {
                Ok(route) => debug!(?route, "heartbeat sent"),
                Err(err) => warn!(%err, "heartbeat not delivered"),
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("heartbeat loop shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    })
}
