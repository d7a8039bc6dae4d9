//! Error taxonomy for camera sessions.
//!
//! Every failure surfaced by this crate is exactly one [`ErrorKind`], and each
//! kind carries a numeric code that is part of the external contract. Bindings
//! in other languages branch on these codes (most notably `2`, the
//! "session not opened" error), so they must never be renumbered.

use std::time::Duration;

/// Result type for camera operations.
pub type CamResult<T> = Result<T, CamError>;

/// Stable failure kinds with their numeric codes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The module has not been initialized.
    NotInitialized = 1,
    /// The handle does not name an opened session.
    Uninitialized = 2,
    /// The handle referred to a session that has since been closed.
    InvalidHandle = 3,
    /// Requested resolution or capture rate is not in the capability set.
    UnsupportedParameter = 4,
    /// Connecting to (or talking to) the device failed.
    DeviceUnreachable = 5,
    /// A blocking operation exceeded its bound.
    Timeout = 6,
    /// Requested frame index is not below the valid-frame count.
    FrameIndexOutOfRange = 7,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::NotInitialized,
        ErrorKind::Uninitialized,
        ErrorKind::InvalidHandle,
        ErrorKind::UnsupportedParameter,
        ErrorKind::DeviceUnreachable,
        ErrorKind::Timeout,
        ErrorKind::FrameIndexOutOfRange,
    ];

    /// The stable numeric code for this kind.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a kind from its numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Operational errors are expected at runtime and worth handling
    /// (retry, report to an operator). Everything else is a caller bug.
    pub fn is_operational(self) -> bool {
        matches!(self, ErrorKind::DeviceUnreachable | ErrorKind::Timeout)
    }
}

/// Errors returned by the capture API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CamError {
    #[error("module not initialized: call initialize_module() before {operation}")]
    NotInitialized { operation: &'static str },

    #[error("session {handle:#x} is not open")]
    Uninitialized { handle: u64 },

    #[error("handle {handle:#x} does not reference a live session")]
    InvalidHandle { handle: u64 },

    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("device at '{address}' unreachable: {message}")]
    DeviceUnreachable { address: String, message: String },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("frame index {index} out of range ({count} frame(s) in memory)")]
    FrameIndexOutOfRange { index: usize, count: usize },
}

impl CamError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CamError::NotInitialized { .. } => ErrorKind::NotInitialized,
            CamError::Uninitialized { .. } => ErrorKind::Uninitialized,
            CamError::InvalidHandle { .. } => ErrorKind::InvalidHandle,
            CamError::UnsupportedParameter(_) => ErrorKind::UnsupportedParameter,
            CamError::DeviceUnreachable { .. } => ErrorKind::DeviceUnreachable,
            CamError::Timeout { .. } => ErrorKind::Timeout,
            CamError::FrameIndexOutOfRange { .. } => ErrorKind::FrameIndexOutOfRange,
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> u32 {
        self.kind().code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorKind::NotInitialized.code(), 1);
        assert_eq!(ErrorKind::Uninitialized.code(), 2);
        assert_eq!(ErrorKind::InvalidHandle.code(), 3);
        assert_eq!(ErrorKind::UnsupportedParameter.code(), 4);
        assert_eq!(ErrorKind::DeviceUnreachable.code(), 5);
        assert_eq!(ErrorKind::Timeout.code(), 6);
        assert_eq!(ErrorKind::FrameIndexOutOfRange.code(), 7);
    }

    #[test]
    fn test_from_code() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
        assert_eq!(ErrorKind::from_code(8), None);
    }

    #[test]
    fn test_operational_class() {
        assert!(ErrorKind::DeviceUnreachable.is_operational());
        assert!(ErrorKind::Timeout.is_operational());
        assert!(!ErrorKind::NotInitialized.is_operational());
        assert!(!ErrorKind::InvalidHandle.is_operational());
    }

    #[test]
    fn test_error_kind_and_code() {
        let err = CamError::Uninitialized { handle: 0 };
        assert_eq!(err.kind(), ErrorKind::Uninitialized);
        assert_eq!(err.code(), 2);

        let err = CamError::FrameIndexOutOfRange { index: 4, count: 4 };
        assert_eq!(err.code(), 7);
    }

    #[test]
    fn test_error_display() {
        let err = CamError::DeviceUnreachable {
            address: "192.168.0.10".to_string(),
            message: "no device detected".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "device at '192.168.0.10' unreachable: no device detected"
        );

        let err = CamError::FrameIndexOutOfRange { index: 9, count: 3 };
        assert!(format!("{}", err).contains("frame index 9"));
        assert!(format!("{}", err).contains("3 frame(s)"));

        let err = CamError::NotInitialized {
            operation: "open_by_address",
        };
        assert!(format!("{}", err).contains("open_by_address"));
    }
}
