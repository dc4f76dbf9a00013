//! # InferMesh Discovery
//!
//! Materializes a ranked list of candidate hosts for a `(chain, model)`
//! pair: enumerate the on-chain registry, filter on activity, stake,
//! model support and price, optionally probe each host's health
//! endpoint, and order by a weighted score. Results are cached for five
//! minutes per key.

pub mod cache;
pub mod error;
pub mod probe;
pub mod score;
pub mod service;

pub use cache::DiscoveryCache;
pub use error::{DiscoveryError, Result};
pub use probe::{probe_health, ProbeOutcome};
pub use score::{rank, Candidate, RankedHost};
pub use service::{Discovery, DiscoveryQuery};
