//! Error types for device sessions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for evsession operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures surfaced by sessions, the decoder and the pump.
///
/// Would-block reads are not errors and never show up here; the decoder
/// reports them as [`Decoded::NoData`](crate::decoder::Decoded::NoData).
#[derive(Debug, Error)]
pub enum Error {
    /// The device node could not be opened.
    #[error("cannot open {}: {}", .path.display(), describe(.code))]
    Open {
        /// Positive errno value.
        code: i32,
        /// Path that was requested.
        path: PathBuf,
    },

    /// A read (or readiness wait) failed with something other than would-block.
    #[error("read failed: {}", describe(.code))]
    Read {
        /// Positive errno value.
        code: i32,
    },

    /// A grab or ungrab request was rejected by the kernel.
    #[error("grab request failed: {}", describe(.code))]
    Grab {
        /// Positive errno value.
        code: i32,
    },

    /// The session was already closed.
    #[error("session used after close")]
    UseAfterClose,

    /// The requested feature is not available in this build or platform.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Thread-related error (poisoned lock, failed join).
    #[error("thread error: {0}")]
    ThreadError(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The errno carried by the error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Open { code, .. } | Error::Read { code } | Error::Grab { code } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn open(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Error::Open {
            code: errno(err),
            path: path.into(),
        }
    }

    pub(crate) fn read(err: &std::io::Error) -> Self {
        Error::Read { code: errno(err) }
    }

    pub(crate) fn grab(err: &std::io::Error) -> Self {
        Error::Grab { code: errno(err) }
    }

    pub(crate) fn poisoned() -> Self {
        Error::ThreadError("mutex poisoned".into())
    }
}

/// Errno of an I/O error; `EIO` when the error did not come from the OS.
pub(crate) fn errno(err: &std::io::Error) -> i32 {
    const EIO: i32 = 5;
    err.raw_os_error().unwrap_or(EIO)
}

fn describe(code: &i32) -> String {
    format!("{} (errno {})", std::io::Error::from_raw_os_error(*code), code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_open_error_keeps_path_and_code() {
        let err = Error::open("/dev/input/event7", &io::Error::from_raw_os_error(13));
        assert_eq!(err.code(), Some(13));
        let text = err.to_string();
        assert!(text.contains("/dev/input/event7"));
        assert!(text.contains("errno 13"));
    }

    #[test]
    fn test_non_os_error_maps_to_eio() {
        let err = Error::read(&io::Error::other("boom"));
        assert_eq!(err.code(), Some(5));
    }

    #[test]
    fn test_use_after_close_has_no_code() {
        assert_eq!(Error::UseAfterClose.code(), None);
    }
}
