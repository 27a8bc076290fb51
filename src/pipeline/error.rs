//! Closed error taxonomy for the pipeline worker
//!
//! Mirrors the `ErrorKind` strings the host expects on an `error` message,
//! and carries enough detail to build a `stack` string from the error chain.

use std::fmt;

/// The closed set of error kinds surfaced to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotSupported,
    InitializationFailed,
    ConfigurationError,
    VideoEncodingError,
    AudioEncodingError,
    MuxingFailed,
    Cancelled,
    WorkerError,
    InternalError,
    Unknown,
}

impl ErrorKind {
    /// The wire string used in `error.errorDetail.type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSupported => "not-supported",
            Self::InitializationFailed => "initialization-failed",
            Self::ConfigurationError => "configuration-error",
            Self::VideoEncodingError => "video-encoding-error",
            Self::AudioEncodingError => "audio-encoding-error",
            Self::MuxingFailed => "muxing-failed",
            Self::Cancelled => "cancelled",
            Self::WorkerError => "worker-error",
            Self::InternalError => "internal-error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-wide error type, one variant per `ErrorKind`
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("video encoding error: {0}")]
    VideoEncodingError(String),

    #[error("audio encoding error: {0}")]
    AudioEncodingError(String),

    #[error("muxing failed: {0}")]
    MuxingFailed(String),

    #[error("session cancelled")]
    Cancelled,

    #[error("worker error: {0}")]
    WorkerError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// The `ErrorKind` this error reports as
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::InitializationFailed(_) => ErrorKind::InitializationFailed,
            Self::ConfigurationError(_) => ErrorKind::ConfigurationError,
            Self::VideoEncodingError(_) => ErrorKind::VideoEncodingError,
            Self::AudioEncodingError(_) => ErrorKind::AudioEncodingError,
            Self::MuxingFailed(_) => ErrorKind::MuxingFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::WorkerError(_) => ErrorKind::WorkerError,
            Self::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// Build a "stack" string by walking `source()` the way a JS Error.stack would read
    pub fn stack(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            lines.push(format!("caused by: {err}"));
            source = err.source();
        }
        lines.join("\n")
    }
}

impl From<crate::codec::CodecError> for PipelineError {
    fn from(err: crate::codec::CodecError) -> Self {
        use crate::codec::CodecError as E;
        match err {
            E::EncoderNotFound(_) | E::CodecNotFound(_) => Self::NotSupported(err.to_string()),
            E::InvalidConfig(_) | E::UnsupportedPixelFormat(_) => {
                Self::ConfigurationError(err.to_string())
            }
            other => Self::InitializationFailed(other.to_string()),
        }
    }
}

impl From<napi::Error> for PipelineError {
    fn from(err: napi::Error) -> Self {
        Self::WorkerError(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::WorkerError(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_strings_match_wire_protocol() {
        assert_eq!(ErrorKind::NotSupported.as_str(), "not-supported");
        assert_eq!(ErrorKind::MuxingFailed.as_str(), "muxing-failed");
        assert_eq!(ErrorKind::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn codec_error_not_found_maps_to_not_supported() {
        let err: PipelineError =
            crate::codec::CodecError::CodecNotFound("libx264".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn stack_includes_source_chain() {
        let err = PipelineError::MuxingFailed("write failed".into());
        assert!(err.stack().contains("write failed"));
    }
}
