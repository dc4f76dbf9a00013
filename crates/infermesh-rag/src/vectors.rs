//! Vector validation and the session attachment surface.

use crate::error::{RagError, Result};
use infermesh_session::{SessionHandle, VectorRecord, VectorSearchResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Embedding dimension (all-MiniLM-L6-v2).
pub const VECTOR_DIM: usize = 384;
/// Vectors per `upload_vectors` frame.
pub const MAX_BATCH: usize = 1000;
/// Approximate per-session capacity on the host.
pub const SESSION_CAPACITY: usize = 100_000;
pub const MAX_K: u32 = 20;
pub const DEFAULT_THRESHOLD: f32 = 0.2;

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub(crate) fn validate_vector(v: &VectorRecord) -> Result<()> {
    if v.vector.len() != VECTOR_DIM {
        return Err(RagError::Validation(format!(
            "vector `{}` has dimension {}, expected {VECTOR_DIM}",
            v.id,
            v.vector.len()
        )));
    }
    if v.vector.iter().any(|x| !x.is_finite()) {
        return Err(RagError::Validation(format!("vector `{}` contains NaN/Inf", v.id)));
    }
    Ok(())
}

pub(crate) fn validate_query(query: &[f32], k: u32, threshold: f32) -> Result<()> {
    if query.len() != VECTOR_DIM {
        return Err(RagError::Validation(format!(
            "query dimension {}, expected {VECTOR_DIM}",
            query.len()
        )));
    }
    if k == 0 || k > MAX_K {
        return Err(RagError::Validation(format!("k must be in 1..={MAX_K}, got {k}")));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RagError::Validation(format!("threshold must be in 0..=1, got {threshold}")));
    }
    Ok(())
}

/// RAG surface over one active session.
pub struct VectorAttachment {
    session: SessionHandle,
    uploaded: AtomicUsize,
}

impl VectorAttachment {
    pub fn new(session: SessionHandle) -> Self {
        Self { session, uploaded: AtomicUsize::new(0) }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// How many vectors this attachment has pushed so far.
    pub fn uploaded(&self) -> usize {
        self.uploaded.load(Ordering::Relaxed)
    }

    /// Upload vectors, splitting into frames of at most [`MAX_BATCH`].
    /// `replace` clears the host-side store before the first frame.
    pub async fn upload(&self, vectors: Vec<VectorRecord>, replace: bool) -> Result<u32> {
        for v in &vectors {
            validate_vector(v)?;
        }
        let current = if replace { 0 } else { self.uploaded.load(Ordering::Relaxed) };
        if current + vectors.len() > SESSION_CAPACITY {
            return Err(RagError::CapacityExceeded {
                current,
                adding: vectors.len(),
                capacity: SESSION_CAPACITY,
            });
        }

        let mut total = 0u32;
        let mut first = true;
        let batches = vectors.len().div_ceil(MAX_BATCH);
        for batch in vectors.chunks(MAX_BATCH) {
            let accepted =
                self.session.upload_vectors(batch.to_vec(), replace && first).await?;
            total += accepted;
            first = false;
        }
        if replace {
            self.uploaded.store(total as usize, Ordering::Relaxed);
        } else {
            self.uploaded.fetch_add(total as usize, Ordering::Relaxed);
        }
        debug!("uploaded {total} vectors in {batches} frame(s)");
        Ok(total)
    }

    /// Ranked nearest neighbours above `threshold`, best first.
    pub async fn search(
        &self,
        query: Vec<f32>,
        k: u32,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResult>> {
        validate_query(&query, k, threshold)?;
        Ok(self.session.search_vectors(query, k, threshold).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, dim: usize) -> VectorRecord {
        VectorRecord { id: id.into(), vector: vec![0.5; dim], metadata: Default::default() }
    }

    #[test]
    fn test_cosine_similarity_basics() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0; 3], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_vector_dimension_enforced() {
        assert!(validate_vector(&record("ok", VECTOR_DIM)).is_ok());
        assert!(validate_vector(&record("short", 128)).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let mut v = record("nan", VECTOR_DIM);
        v.vector[7] = f32::NAN;
        assert!(validate_vector(&v).is_err());
    }

    #[test]
    fn test_query_bounds() {
        let q = vec![0.1; VECTOR_DIM];
        assert!(validate_query(&q, 20, 0.2).is_ok());
        assert!(validate_query(&q, 21, 0.2).is_err());
        assert!(validate_query(&q, 0, 0.2).is_err());
        assert!(validate_query(&q, 5, 1.5).is_err());
        assert!(validate_query(&q, 5, -0.1).is_err());
        assert!(validate_query(&[0.1; 10], 5, 0.2).is_err());
    }
}
