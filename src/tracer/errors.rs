//! Typed tracer errors.
//!
//! Callers match on the variant (the error code) rather than parsing
//! message text; the inner cause is preserved for logging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("failed to load probe object from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to attach {program} to {symbol}")]
    AttachFailed {
        program: String,
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create ring buffer reader")]
    RingBufferFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("probe map {name} not found in object")]
    MapNotFound { name: String },

    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
}
