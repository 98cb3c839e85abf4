//! Error types for the frame graph.
//!
//! Only environment failures are represented here. Misuse of the graph API
//! (foreign handles, undeclared accesses, phase violations) panics instead.

use thiserror::Error;

/// Errors that can occur while creating or recording GPU work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Failed to create a backend object (buffer, image, pool, semaphore, ...).
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,

    /// The device was lost.
    #[error("device lost")]
    DeviceLost,

    /// A fence wait did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Invalid parameter provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A shader, pipeline, mesh or texture could not be resolved from its cache.
    #[error("missing {0}")]
    MissingCollaborator(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::InitializationFailed("test".to_string());
        assert_eq!(format!("{err}"), "initialization failed: test");

        let err = GraphicsError::OutOfMemory;
        assert_eq!(format!("{err}"), "out of GPU memory");

        let err = GraphicsError::MissingCollaborator("shader 'pbr'".to_string());
        assert_eq!(format!("{err}"), "missing shader 'pbr'");
    }
}
