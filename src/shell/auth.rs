//! Authentication strategies for SSH connections.
//!
//! Only password authentication is offered to chat users, but the
//! connection code depends on the [`AuthStrategy`] trait so other methods
//! can be added without touching it.

use async_trait::async_trait;
use russh::client;
use secrecy::{ExposeSecret, SecretString};

use super::client::SshClientHandler;
use super::error::TransportError;

/// Trait for SSH authentication strategies.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// * `Ok(true)` - authentication succeeded
    /// * `Ok(false)` - credentials rejected
    /// * `Err(_)` - protocol error during the attempt
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError>;

    /// Name used in log lines.
    fn name(&self) -> &'static str;
}

/// Password authentication strategy.
pub struct PasswordAuth<'a> {
    password: &'a SecretString,
}

impl<'a> PasswordAuth<'a> {
    pub fn new(password: &'a SecretString) -> Self {
        Self { password }
    }
}

#[async_trait]
impl<'a> AuthStrategy for PasswordAuth<'a> {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError> {
        let result = handle
            .authenticate_password(username, self.password.expose_secret())
            .await?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
