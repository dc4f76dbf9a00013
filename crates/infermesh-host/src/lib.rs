//! # InferMesh Host Supervisor
//!
//! Runs on host operators, separate from the inference engine itself:
//! resolves and spawns the inference binary, probes its health, watches
//! its session lifecycle events over a local WebSocket, publishes
//! checkpoints and submits proofs on every boundary, and restarts the
//! subprocess per policy.

pub mod binary;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod process;
pub mod proofs;
pub mod restart;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{HostError, Result};
pub use events::HostEvent;
pub use restart::{RestartPolicy, RestartTracker};
pub use supervisor::Supervisor;
