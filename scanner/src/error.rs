//! The closed error taxonomy the protocol engine can raise.
//!
//! Transport failures (a `send`/`recv` that the [`crate::connexion::Connexion`]
//! itself could not complete) are wrapped rather than folded into the
//! protocol-level kinds below, since they originate outside the command
//! layer's own closed set.

use thiserror::Error;

/// A scanner status code, used by [`ScanError::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemErrorCode {
    CoverOpen,
    MediaOut,
    MediaJam,
    PermissionDenied,
    UnknownError,
}

/// Errors the ESC/I protocol engine can raise.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The device replied NAK to a command header.
    #[error("invalid command")]
    InvalidCommand,

    /// The device replied NAK to a parameter block.
    #[error("invalid parameter")]
    InvalidParameter,

    /// The device replied with a byte this driver does not recognize for
    /// the command in question.
    #[error("unknown reply: {0:#04x}")]
    UnknownReply(u8),

    /// Exclusive access was refused (capture-scanner returned 0x40).
    #[error("device busy")]
    DeviceBusy,

    /// A structural violation in a reply, such as a bad info-block header.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A composite device-state failure surfaced during acquisition, with a
    /// message derived from the last scanner status.
    #[error("{message}")]
    System {
        code: SystemErrorCode,
        message: String,
    },

    /// Option-map validation failed (e.g. scan area below the minimum).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The underlying connexion could not complete a `send`/`recv`.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
