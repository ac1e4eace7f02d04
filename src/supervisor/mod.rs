//! Worker supervision: handles, discovery, the registry and its loops.

pub mod commands;
pub mod discovery;
pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod monitor;

pub use handle::{StartOutcome, StopOutcome, Timings, WorkerHandle};
pub use manager::{DiscoveryReport, Supervisor, SupervisorSettings};
