//! Error types for shell sessions and their transport.
//!
//! Two layers of errors exist:
//!
//! - [`TransportError`]: failures of the SSH connection or shell channel
//!   (connect, authentication, dropped channel).
//! - [`SessionError`]: what a session operation reports to the front end.
//!   Every variant is recovered at the session boundary; none of them is
//!   fatal to the process or visible to other sessions.
//!
//! # Retry Classification
//!
//! Connect attempts are retried only for transient failures. Authentication
//! failures take precedence over connection keywords, so an error such as
//! "Connection timeout during authentication failed" is never retried, to
//! avoid repeatedly failing with bad credentials.

use std::time::Duration;

use thiserror::Error;

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Failures of the SSH transport or the shell channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP connect or SSH handshake failed
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// Credentials were rejected by the server
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Connect did not complete in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// SSH protocol or channel request error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// The shell channel was closed by the remote side
    #[error("Shell channel closed")]
    ChannelClosed,
}

impl TransportError {
    /// Whether a connect attempt failing with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::AuthenticationFailed { .. } => false,
            TransportError::Timeout(_) => true,
            TransportError::ChannelClosed => false,
            TransportError::Connect { reason, .. } => is_retryable_message(reason),
            TransportError::Ssh(e) => is_retryable_message(&e.to_string()),
        }
    }
}

/// Classify a free-form error message.
///
/// Auth patterns win over connection patterns. Messages matching neither are
/// retried unless they look like an SSH protocol error without a timeout or
/// connect keyword.
pub(crate) fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();

    if AUTH_ERRORS.iter().any(|p| lower.contains(p)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|p| lower.contains(p)) {
        return true;
    }

    if lower.contains("ssh") {
        return lower.contains("timeout") || lower.contains("connect");
    }

    true
}

/// Errors reported by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Auth or network failure while connecting; the session stays disconnected
    #[error("{0}")]
    ConnectFailure(String),

    /// The shell channel broke mid-session; the session was torn down
    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] TransportError),

    /// No live shell for this user
    #[error("No active SSH connection")]
    NotConnected,

    /// Another command is still running on this session
    #[error("A command is already running on this session")]
    Busy,

    /// The registry is shutting down and opens no new connections
    #[error("Shutting down")]
    ShuttingDown,
}
