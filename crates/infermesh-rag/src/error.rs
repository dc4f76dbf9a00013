use infermesh_core::{ErrorClass, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session vector capacity exceeded ({current} + {adding} > {capacity})")]
    CapacityExceeded { current: usize, adding: usize, capacity: usize },

    #[error("Image processing failed: OCR and description both unavailable")]
    ImageProcessingFailed,

    #[error("Host model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Host HTTP error: {0}")]
    Http(String),

    #[error(transparent)]
    Session(#[from] infermesh_session::SessionError),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl Retryable for RagError {
    fn class(&self) -> ErrorClass {
        match self {
            RagError::Http(_) => ErrorClass::Transient,
            // 503 during warm-up clears on its own
            RagError::ModelNotLoaded(_) => ErrorClass::Transient,
            RagError::Session(e) => e.class(),
            _ => ErrorClass::Fatal,
        }
    }
}
