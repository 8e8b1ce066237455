//! Error types for kvsweep-session.

use std::io;

use serde::Serialize;

use crate::types::{Key, ProtocolVersion};

/// Result type alias for commands on an open session.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Malformed or unexpected data on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Bytes that do not form a valid reply, including nesting past the
    /// parser's depth limit.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// A well-formed frame with the wrong shape for the command sent.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Failure of one request/response round-trip on a session.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// IO error (includes timeouts).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The session was closed, or broken by an earlier transport failure.
    #[error("session closed")]
    Closed,
}

impl CommandError {
    /// Returns true if the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CommandError::Server(_) | CommandError::Protocol(ProtocolError::UnexpectedReply(_))
        )
    }
}

/// Classified failure of a negotiation attempt.
///
/// Every variant is terminal for the attempt. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The intent failed validation or its CA bundle could not be loaded.
    #[error("invalid connection intent: {0}")]
    InvalidIntent(String),

    /// DNS, connect, reset or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The peer certificate chain or hostname did not verify.
    #[error("tls verification failed: {reason}")]
    TlsVerification { reason: String },

    /// The credential was rejected, or one is required and none was given.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The peer answered but rejected the requested protocol version.
    #[error("protocol {requested} rejected by server: {reason}")]
    ProtocolIncompatible {
        requested: ProtocolVersion,
        reason: String,
    },

    /// The store rejected a handshake command for another reason.
    #[error("server rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
}

impl NegotiationError {
    /// A short suggestion for the operator, if there is an explicit next step.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            NegotiationError::ProtocolIncompatible {
                requested: ProtocolVersion::Resp3,
                ..
            } => Some("the server does not speak RESP3; retry with the legacy protocol enabled"),
            NegotiationError::TlsVerification { .. } => Some(
                "supply the issuing CA bundle, or explicitly disable verification if you accept an unauthenticated server",
            ),
            NegotiationError::Authentication { .. } => Some("check the username and password"),
            _ => None,
        }
    }
}

/// Failure while enumerating keys.
///
/// Keys yielded before the failure remain valid.
#[derive(Debug, thiserror::Error)]
#[error("scan failed at cursor {cursor} after {steps} step(s) and {yielded} key(s): {source}")]
pub struct ScanError {
    /// Cursor of the step that failed.
    pub cursor: u64,
    /// Steps completed before the failure.
    pub steps: usize,
    /// Keys already yielded.
    pub yielded: usize,
    /// Underlying command failure.
    pub source: CommandError,
}

/// Failure to delete one key. Collected into the deletion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{key}: {reason}")]
pub struct DeletionError {
    pub key: Key,
    pub reason: String,
}
