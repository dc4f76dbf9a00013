//! # InferMesh RAG Attachment
//!
//! Session-scoped retrieval: upload embedding vectors into the host's
//! per-session store, search them by cosine similarity, and build
//! context-augmented prompts. Vectors never persist; the host discards
//! them when the session WebSocket closes.
//!
//! Images ride the host's vision endpoints: OCR and description run in
//! parallel, the combined text is chunked, embedded and uploaded.

pub mod context;
pub mod error;
pub mod host_api;
pub mod image;
pub mod vectors;

pub use context::ask_with_context;
pub use error::{RagError, Result};
pub use host_api::{HostApiClient, HostStatus, VersionInfo};
pub use image::{attach_image, chunk_text, process_image, ImageFormat, ProcessedImage};
pub use vectors::{
    cosine_similarity, VectorAttachment, DEFAULT_THRESHOLD, MAX_BATCH, MAX_K, SESSION_CAPACITY,
    VECTOR_DIM,
};
