// Domain errors - Error taxonomy for a scrambling job

use std::fmt;

/// Discriminant of a [`DomainError`], cheap to copy and compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LoadError,
    SeekTimeout,
    CodecUnsupported,
    EncodeFailure,
    UploadTimeout,
    UploadFailure,
    Cancelled,
    InvalidParameters,
    BufferLimitExceeded,
}

impl ErrorKind {
    /// Stable snake_case name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LoadError => "load_error",
            ErrorKind::SeekTimeout => "seek_timeout",
            ErrorKind::CodecUnsupported => "codec_unsupported",
            ErrorKind::EncodeFailure => "encode_failure",
            ErrorKind::UploadTimeout => "upload_timeout",
            ErrorKind::UploadFailure => "upload_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::BufferLimitExceeded => "buffer_limit_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Source metadata (duration, dimensions) could not be obtained
    LoadError(String),
    /// A frame positioning request exceeded its bound
    SeekTimeout {
        frame_index: u64,
        target_seconds: f64,
        bound_secs: u64,
    },
    /// No candidate encoder was accepted by the host
    CodecUnsupported(Vec<String>),
    /// The encoder reported an error mid-stream
    EncodeFailure(String),
    /// The upload collaborator never produced an asset
    UploadTimeout { upload_id: String, attempts: u32 },
    /// The upload collaborator rejected the transfer or returned an unusable asset
    UploadFailure(String),
    /// The job was cancelled through its token
    Cancelled(String),
    /// Caller supplied parameters outside their domain
    InvalidParameters(String),
    /// The raw frame buffer would exceed the configured cap
    BufferLimitExceeded { required: u64, limit: u64 },
}

impl DomainError {
    /// Error kind discriminant
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::LoadError(_) => ErrorKind::LoadError,
            DomainError::SeekTimeout { .. } => ErrorKind::SeekTimeout,
            DomainError::CodecUnsupported(_) => ErrorKind::CodecUnsupported,
            DomainError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            DomainError::UploadTimeout { .. } => ErrorKind::UploadTimeout,
            DomainError::UploadFailure(_) => ErrorKind::UploadFailure,
            DomainError::Cancelled(_) => ErrorKind::Cancelled,
            DomainError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            DomainError::BufferLimitExceeded { .. } => ErrorKind::BufferLimitExceeded,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::LoadError(msg) => write!(f, "Failed to load source: {}", msg),
            DomainError::SeekTimeout {
                frame_index,
                target_seconds,
                bound_secs,
            } => write!(
                f,
                "Seek to frame {} ({:.3}s) did not complete within {}s",
                frame_index, target_seconds, bound_secs
            ),
            DomainError::CodecUnsupported(candidates) => write!(
                f,
                "No supported encoder among candidates: {}",
                candidates.join(", ")
            ),
            DomainError::EncodeFailure(msg) => write!(f, "Encoding failed: {}", msg),
            DomainError::UploadTimeout {
                upload_id,
                attempts,
            } => write!(
                f,
                "Upload {} was not processed after {} status checks",
                upload_id, attempts
            ),
            DomainError::UploadFailure(msg) => write!(f, "Upload failed: {}", msg),
            DomainError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
            DomainError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            DomainError::BufferLimitExceeded { required, limit } => write!(
                f,
                "Frame buffer needs {} bytes but the limit is {} bytes",
                required, limit
            ),
        }
    }
}

impl std::error::Error for DomainError {}
