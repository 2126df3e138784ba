//! Error types for pubsync operations.

use thiserror::Error;

/// Errors that can occur during pubsync operations.
#[derive(Error, Debug)]
pub enum PubsyncError {
    /// I/O error during transport operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// IBLT erase of a key whose cells are inconsistent (never inserted,
    /// or already erased). The table is left unchanged.
    #[error("invalid IBLT erase: inconsistent cells for key {key:#010x}")]
    InvalidErase {
        /// Key whose erase was refused.
        key: u32,
    },

    /// Received IBLT component decompressed to the wrong cell-array size.
    #[error("IBLT size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Cell-array byte length for the configured capacity.
        expected: usize,
        /// Byte length actually decoded.
        actual: usize,
    },

    /// Peel decode stopped with undecoded cells remaining. The partial
    /// result is still usable; callers serve the known subset.
    #[error("IBLT decode incomplete: {residual} cells undecoded")]
    DecodeIncomplete {
        /// Number of non-empty cells left after peeling.
        residual: usize,
    },

    /// Reply payload whose outer element is not the publication block.
    #[error("bad payload tag: expected 129, got {tag}")]
    BadPayloadTag {
        /// Tag value actually seen.
        tag: u8,
    },

    /// Serialization or compression failure while encoding or decoding.
    #[error("codec error: {0}")]
    Codec(String),

    /// The forwarder refused to install the reconciliation prefix. Fatal.
    #[error("prefix registration failed: {reason}")]
    RegisterFailed {
        /// Reason reported by the forwarder.
        reason: String,
    },

    /// The engine has stopped and no longer accepts commands.
    #[error("engine stopped")]
    Stopped,
}

/// Result type for pubsync operations.
pub type Result<T> = std::result::Result<T, PubsyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = PubsyncError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_display_invalid_erase() {
        let err = PubsyncError::InvalidErase { key: 0xdead_beef };
        assert!(err.to_string().contains("0xdeadbeef"));
    }

    #[test]
    fn error_display_size_mismatch() {
        let err = PubsyncError::SizeMismatch {
            expected: 576,
            actual: 288,
        };
        let msg = err.to_string();
        assert!(msg.contains("576"));
        assert!(msg.contains("288"));
    }

    #[test]
    fn error_display_decode_incomplete() {
        let err = PubsyncError::DecodeIncomplete { residual: 7 };
        assert!(err.to_string().contains("7 cells"));
    }

    #[test]
    fn error_display_bad_payload_tag() {
        let err = PubsyncError::BadPayloadTag { tag: 42 };
        let msg = err.to_string();
        assert!(msg.contains("129"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn error_display_register_failed() {
        let err = PubsyncError::RegisterFailed {
            reason: "no route".to_string(),
        };
        assert!(err.to_string().contains("no route"));
    }

    #[test]
    fn result_type_err() {
        let result: Result<()> = Err(PubsyncError::Stopped);
        assert!(result.is_err());
    }
}
