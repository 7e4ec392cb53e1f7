//! Error taxonomy shared by the registry, store, and service layers.

use thiserror::Error;

/// Errors that can occur while ingesting or processing an image.
///
/// Cancellation and deadline expiry are transport concerns and are not
/// represented here; the gRPC layer surfaces those directly.
#[derive(Debug, Error)]
pub enum ImageError {
    /// A frame arrived that the protocol cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The handle was never issued by this registry.
    #[error("unknown image: {0}")]
    UnknownImage(String),
    /// Storage read or write failure during ingest.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ImageError {
    /// True if this error means the handle is simply not known,
    /// as opposed to an internal fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImageError::UnknownImage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_image_is_not_found() {
        let err = ImageError::UnknownImage("abc".to_string());
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "unknown image: abc");
    }

    #[test]
    fn test_io_error_is_not_not_found() {
        let err = ImageError::from(std::io::Error::other("disk gone"));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("disk gone"));
    }
}
