//! Error types shared by every part of the engine.

use thiserror::Error;

/// Errors raised while building, configuring or training a model.
#[derive(Debug, Error)]
pub enum NnError {
    /// A buffer of `requested` elements could not be allocated.
    #[error("out of memory: failed to allocate {requested} elements")]
    OutOfMemory { requested: usize },

    /// Two connected buffers disagree on their length.
    #[error("shape mismatch in {context}: expected {expected}, received {received}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        received: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NnError {
    pub(crate) fn shape(context: &'static str, expected: usize, received: usize) -> Self {
        NnError::ShapeMismatch {
            context,
            expected,
            received,
        }
    }

    pub(crate) fn config(why: impl Into<String>) -> Self {
        NnError::InvalidConfiguration(why.into())
    }
}

pub type Result<T> = std::result::Result<T, NnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = NnError::shape("dataset inputs", 4, 3);
        assert_eq!(
            err.to_string(),
            "shape mismatch in dataset inputs: expected 4, received 3"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NnError = io.into();
        assert!(matches!(err, NnError::Io(_)));
    }
}
