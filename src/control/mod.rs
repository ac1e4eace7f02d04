//! Control-plane communication.
//!
//! The supervisor talks to the control plane through two traits so the
//! orchestration core never depends on a concrete transport:
//!
//! - [`Uplink`] publishes reports: events over the persistent channel and
//!   the one-shot HTTP heartbeat used when that channel is down.
//! - [`ArtifactSource`] serves a worker's declared file set.
//!
//! [`client::ControlPlaneClient`] implements `Uplink` over a Socket.IO
//! WebSocket, and [`http::ApiClient`] implements `ArtifactSource`.

pub mod client;
pub mod http;
pub mod protocol;

use std::future::Future;
use std::pin::Pin;

use crate::models::artifact::ArtifactBundle;
use crate::models::command::OutboundEvent;
use crate::models::host::HostStatus;
use crate::Result;

/// Outbound reporting surface of the control plane.
pub trait Uplink: Send + Sync {
    /// Whether the persistent channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Publish an event over the persistent channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`](crate::AppError::Channel) when the
    /// channel is not connected or the event cannot be queued.
    fn emit(&self, event: OutboundEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Send a heartbeat through the one-shot HTTP fallback.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`](crate::AppError::Http) if the request
    /// fails or the response status is not 200.
    fn post_heartbeat<'a>(
        &'a self,
        status: &'a HostStatus,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Close the persistent channel. Idempotent.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Source of worker artifact sets.
pub trait ArtifactSource: Send + Sync {
    /// Fetch the metadata and declared files of a worker.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`](crate::AppError::Http) if the fetch fails
    /// and [`AppError::Sync`](crate::AppError::Sync) if the body is malformed.
    fn fetch<'a>(
        &'a self,
        bot_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ArtifactBundle>> + Send + 'a>>;
}
