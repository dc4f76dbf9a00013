//! # InferMesh Session Engine
//!
//! The per-session state machine over a host WebSocket, plus the
//! escrow-backed payment orchestration around it.
//!
//! One cooperative main task per session owns the socket and the
//! in-memory state; everything else talks to it over channels. Inbound
//! frames are processed strictly in arrival order, stream chunks are
//! index-checked, and every await is cancellation-observable.

pub mod auth;
pub mod codec;
pub mod engine;
pub mod error;
pub mod events;
pub mod frames;
pub mod manager;
pub mod payments;

pub use auth::Identity;
pub use codec::FrameCodec;
pub use engine::{Session, SessionConfig, SessionHandle, StreamItem};
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use frames::{Frame, PromptParameters, VectorRecord, VectorSearchResult};
pub use manager::SessionManager;
pub use payments::{PaymentManager, Settlement};
