//! Error types module
//!
//! All failures of the image subsystem are unified under `AppError`. The variants
//! follow the taxonomy of the blob pipeline: missing documents, corrupt chunk
//! sequences, undecodable images, capacity violations, plus the infrastructure
//! failures reported by document store backends.
//!
//! `AppError` is `Clone` so a single failed fetch can be handed to every caller
//! waiting on the same in-flight request.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be reported and handled.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "CORRUPT_CHUNK")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// User-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt chunk {index} in {reference}: {reason}")]
    CorruptChunk {
        reference: String,
        index: usize,
        reason: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Entry of {size} bytes exceeds cache capacity of {capacity} bytes")]
    CapacityExceeded { size: u64, capacity: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Component disposed: {0}")]
    Disposed(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AppError> },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(format!("JSON parsing error: {}", err))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::Decode(format!("Base64 decoding error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        AppError::NotFound(_) => (
            "NOT_FOUND",
            false,
            Some("Verify the image reference exists"),
            LogLevel::Debug,
        ),
        // A reader can observe a blob whose chunks are still being written.
        AppError::CorruptChunk { .. } => (
            "CORRUPT_CHUNK",
            true,
            Some("Retry; re-upload the image if the problem persists"),
            LogLevel::Warn,
        ),
        AppError::Decode(_) => (
            "DECODE_ERROR",
            false,
            Some("Check image format and try a different file"),
            LogLevel::Warn,
        ),
        AppError::CapacityExceeded { .. } => (
            "CAPACITY_EXCEEDED",
            false,
            Some("Increase cache capacity or skip caching this item"),
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            "INVALID_INPUT",
            false,
            Some("Check parameters and try again"),
            LogLevel::Debug,
        ),
        AppError::Storage(_) => (
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::ImageProcessing(_) => (
            "IMAGE_PROCESSING_ERROR",
            false,
            Some("Check image format and try a different file"),
            LogLevel::Warn,
        ),
        AppError::Cancelled(_) => ("CANCELLED", false, None, LogLevel::Debug),
        AppError::Disposed(_) => ("DISPOSED", false, None, LogLevel::Debug),
        AppError::RetriesExhausted { .. } => (
            "RETRIES_EXHAUSTED",
            false,
            Some("Check connectivity and reload the page"),
            LogLevel::Error,
        ),
        AppError::Internal(_) => (
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the variant name of this error (for logging).
    pub fn variant_name(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::CorruptChunk { .. } => "CorruptChunk",
            AppError::Decode(_) => "Decode",
            AppError::CapacityExceeded { .. } => "CapacityExceeded",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Storage(_) => "Storage",
            AppError::ImageProcessing(_) => "ImageProcessing",
            AppError::Cancelled(_) => "Cancelled",
            AppError::Disposed(_) => "Disposed",
            AppError::RetriesExhausted { .. } => "RetriesExhausted",
            AppError::Internal(_) => "Internal",
        }
    }

    /// The innermost error, looking through `RetriesExhausted` wrappers.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::NotFound(_) => "Image not found".to_string(),
            AppError::CorruptChunk { .. } => "Image data is incomplete".to_string(),
            AppError::Decode(_) => "Image could not be decoded".to_string(),
            AppError::CapacityExceeded { .. } => "Image is too large to cache".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::ImageProcessing(ref msg) => msg.clone(),
            AppError::Cancelled(_) => "Request cancelled".to_string(),
            AppError::Disposed(_) => "Image cache is no longer available".to_string(),
            AppError::RetriesExhausted { .. } => "Failed to load image".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_not_found() {
        let err = AppError::NotFound("products-images/abc".to_string());
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "Image not found");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_corrupt_chunk() {
        let err = AppError::CorruptChunk {
            reference: "products-images/abc".to_string(),
            index: 2,
            reason: "missing".to_string(),
        };
        assert_eq!(err.error_code(), "CORRUPT_CHUNK");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("chunk 2"));
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_capacity_exceeded_message() {
        let err = AppError::CapacityExceeded {
            size: 2000,
            capacity: 1000,
        };
        assert!(err.to_string().contains("2000"));
        assert!(err.to_string().contains("1000"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_retries_exhausted_root_cause() {
        let err = AppError::RetriesExhausted {
            attempts: 3,
            last: Box::new(AppError::Storage("timeout".to_string())),
        };
        assert_eq!(err.error_code(), "RETRIES_EXHAUSTED");
        assert!(!err.is_recoverable());
        assert!(matches!(err.root_cause(), AppError::Storage(_)));
        assert_eq!(err.client_message(), "Failed to load image");
    }

    #[test]
    fn test_error_metadata_suggested_actions() {
        let err1 = AppError::Storage("down".to_string());
        assert_eq!(err1.suggested_action(), Some("Retry after a short delay"));

        let err2 = AppError::Cancelled("view closed".to_string());
        assert_eq!(err2.suggested_action(), None);
    }

    #[test]
    fn test_from_io_error() {
        let err: AppError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
