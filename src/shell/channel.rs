//! Transport seams for shell sessions.
//!
//! The session manager never touches russh directly. It depends on three
//! traits so that tests can substitute scripted fakes:
//!
//! - [`ShellTransport`]: opens authenticated connections.
//! - [`ShellConnection`]: one SSH connection, able to open a shell channel.
//! - [`ShellChannel`]: a bidirectional byte channel with non-blocking reads.
//!
//! Every operation may fail with a [`TransportError`] once the underlying
//! connection dropped.

use std::fmt;

use async_trait::async_trait;
use secrecy::SecretString;

use super::error::TransportError;

/// Parameters for one connect attempt.
///
/// The secret is consumed together with the parameters and is dropped when
/// the connect call returns.
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: SecretString,
}

impl ConnectParams {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Factory for authenticated connections.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Connect and authenticate.
    async fn open_connection(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn ShellConnection>, TransportError>;
}

/// One established SSH connection.
#[async_trait]
pub trait ShellConnection: Send + Sync {
    /// Open an interactive shell channel on this connection.
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A raw interactive shell channel.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    /// Write bytes to the shell.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Whether unread bytes are buffered. Never blocks.
    async fn poll_readable(&self) -> Result<bool, TransportError>;

    /// Drain the buffered bytes, possibly none. Never blocks.
    async fn read_available(&self) -> Result<Vec<u8>, TransportError>;

    /// Close the channel.
    async fn close(&self) -> Result<(), TransportError>;
}
