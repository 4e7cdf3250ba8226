//! Error types for vertex data translation.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced to the draw-call issuer.
///
/// A draw that fails translation is skipped; no device-visible binding is
/// performed before the error is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GlesError {
    /// Allocating or mapping device memory failed.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The attribute state is inconsistent with the requested operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// The format or feature combination is not supported by the active backend.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl From<BackendError> for GlesError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfMemory { .. } => Self::OutOfMemory(err.to_string()),
            BackendError::UnsupportedFormat(_) | BackendError::UnsupportedLayout(_) => {
                Self::Unimplemented(err.to_string())
            }
            BackendError::InitializationFailed(_)
            | BackendError::ForeignHandle(_)
            | BackendError::InvalidParameter(_) => Self::InvalidOperation(err.to_string()),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GlesError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VertexFormat;

    #[test]
    fn test_error_display() {
        let err = GlesError::OutOfMemory("streaming buffer".to_string());
        assert_eq!(err.to_string(), "out of memory: streaming buffer");

        let err = GlesError::Unimplemented("Float32 pure integer".to_string());
        assert_eq!(err.to_string(), "unimplemented: Float32 pure integer");
    }

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            GlesError::from(BackendError::OutOfMemory { requested: 64 }),
            GlesError::OutOfMemory(_)
        ));
        assert!(matches!(
            GlesError::from(BackendError::UnsupportedFormat(VertexFormat::Unorm8)),
            GlesError::Unimplemented(_)
        ));
        assert!(matches!(
            GlesError::from(BackendError::UnsupportedLayout("x".into())),
            GlesError::Unimplemented(_)
        ));
        assert!(matches!(
            GlesError::from(BackendError::ForeignHandle("buffer")),
            GlesError::InvalidOperation(_)
        ));
    }
}
