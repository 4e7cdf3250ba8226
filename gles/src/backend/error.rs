//! Backend error types.

use crate::format::VertexFormat;

/// Failures reported by a device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be brought up.
    InitializationFailed(String),
    /// An allocation of `requested` bytes did not fit in device memory.
    OutOfMemory {
        /// Size of the failed allocation.
        requested: u64,
    },
    /// The backend has no native equivalent of a vertex format.
    UnsupportedFormat(VertexFormat),
    /// The backend cannot express part of an input layout.
    UnsupportedLayout(String),
    /// A handle created by another backend was passed in.
    ForeignHandle(&'static str),
    /// A range or slot argument is out of bounds.
    InvalidParameter(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "backend initialization failed: {msg}"),
            Self::OutOfMemory { requested } => {
                write!(f, "device allocation of {requested} bytes failed")
            }
            Self::UnsupportedFormat(format) => write!(f, "vertex format {format:?} is not supported"),
            Self::UnsupportedLayout(msg) => write!(f, "input layout not supported: {msg}"),
            Self::ForeignHandle(kind) => write!(f, "{kind} belongs to a different backend"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}
