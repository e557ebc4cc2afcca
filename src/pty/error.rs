//! Errors raised by pty sessions and their collaborators

use std::io;
use thiserror::Error;

/// Errors that can occur during PTY operations
#[derive(Error, Debug)]
pub enum PtyError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("Signals are not supported on this platform")]
    SignalsUnsupported,

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] io::Error),

    #[error("Failed to open PTY: {0}")]
    OpenFailed(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    ResizeFailed(#[source] io::Error),

    #[error("Failed to kill process: {0}")]
    KillFailed(#[source] io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Data channel is not connected")]
    NotConnected,
}

/// Result type for PTY operations
pub type PtyResult<T> = Result<T, PtyError>;

/// What a session should do with an error reported by its transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Startup race on a non-blocking fd; nothing happened
    Retry,
    /// The only process on the pty went away
    Hangup,
    /// Anything else
    Fatal,
}

/// Classify a transport error.
pub fn classify(err: &io::Error) -> ErrorClass {
    if err.kind() == io::ErrorKind::WouldBlock {
        return ErrorClass::Retry;
    }

    #[cfg(unix)]
    if err.raw_os_error() == Some(nix::libc::EIO) {
        return ErrorClass::Hangup;
    }

    #[cfg(not(unix))]
    if err.kind() == io::ErrorKind::BrokenPipe {
        return ErrorClass::Hangup;
    }

    ErrorClass::Fatal
}
