//! Framing errors.
//!
//! I/O errors are wrapped in `Arc` so the error stays cheap to clone and
//! satisfies the `result_large_err` lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The frame body could not be serialised.
    #[error("failed to serialise frame: {0}")]
    Serialize(#[source] Arc<serde_json::Error>),

    /// A complete frame arrived but its body is not a valid record.
    #[error("malformed frame body: {0}")]
    Malformed(#[source] Arc<serde_json::Error>),

    /// A complete frame arrived with a length too short to hold a version.
    #[error("frame of {len} bytes is too short to carry a protocol version")]
    Runt {
        /// Declared frame length.
        len: usize,
    },

    /// A complete frame arrived tagged with an unknown protocol version.
    #[error("unsupported protocol version {version}")]
    UnsupportedVersion {
        /// Version found on the wire.
        version: u16,
    },

    /// The declared frame length exceeds the configured limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Declared frame length.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// Reading from or writing to the stream failed.
    #[error("frame I/O failed: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl CodecError {
    /// Returns `true` when the offending frame was consumed whole, so the
    /// stream can continue with the next frame.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::Runt { .. } | Self::UnsupportedVersion { .. }
        )
    }
}

impl From<io::Error> for CodecError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}
