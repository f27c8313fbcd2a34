//! russh-backed implementation of the transport traits.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: keepalive and compression settings; no
//!    inactivity timeout, since a chat session stays open between commands.
//! 2. **Connection Establishment**: TCP connect and handshake bounded by the
//!    connect timeout.
//! 3. **Authentication**: password authentication through [`AuthStrategy`].
//! 4. **Shell**: a session channel with a `vt100` PTY and a login shell. A
//!    background task moves everything the shell prints into a shared
//!    [`OutputBuffer`], which is what makes `poll_readable` and
//!    `read_available` non-blocking. The buffer is bounded, so output
//!    nobody reads only costs its most recent bytes.
//!
//! ## Retry Strategy
//!
//! Connect attempts use exponential backoff with jitter via `backon`,
//! starting at the configured delay and capped at [`MAX_RETRY_DELAY`].
//! Authentication failures are never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect, client, keys};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::auth::{AuthStrategy, PasswordAuth};
use super::buffer::OutputBuffer;
use super::channel::{ConnectParams, ShellChannel, ShellConnection, ShellTransport};
use super::config::{ConnectSettings, MAX_RETRY_DELAY};
use super::error::TransportError;

/// Terminal type requested for the PTY.
const TERMINAL_TYPE: &str = "vt100";
const TERMINAL_COLUMNS: u32 = 80;
const TERMINAL_ROWS: u32 = 24;

/// Client handler for russh that accepts all host keys.
///
/// Equivalent to `StrictHostKeyChecking=no`. Verifying against a
/// known_hosts file would need a place to store it per chat user.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Build the russh client configuration.
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Opens SSH connections with russh.
#[derive(Debug, Clone, Default)]
pub struct RusshTransport {
    settings: ConnectSettings,
}

impl RusshTransport {
    pub fn new(settings: ConnectSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    /// Connect with retry using exponential backoff with jitter.
    async fn connect_with_retry(
        &self,
        params: &ConnectParams,
    ) -> Result<client::Handle<SshClientHandler>, TransportError> {
        let attempt_counter = AtomicU32::new(0);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.settings.retry_delay)
            .with_max_delay(MAX_RETRY_DELAY)
            .with_max_times(self.settings.max_retries as usize)
            .with_jitter();

        let result = (|| async {
            let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);

            if current_attempt > 0 {
                warn!(
                    "SSH connection retry attempt {} to {}@{}:{}",
                    current_attempt, params.username, params.host, params.port
                );
            }

            self.connect_once(params).await
        })
        .retry(backoff)
        .when(|e: &TransportError| {
            let retryable = e.is_retryable();
            if !retryable {
                warn!(
                    "SSH connection to {}@{} failed with non-retryable error: {}",
                    params.username, params.host, e
                );
            }
            retryable
        })
        .notify(|err, dur| {
            warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
        })
        .await;

        let total_attempts = attempt_counter.load(Ordering::SeqCst);
        let retry_count = total_attempts.saturating_sub(1);

        match result {
            Ok(handle) => {
                if retry_count > 0 {
                    info!(
                        "SSH connection to {}@{} succeeded after {} retry attempt(s)",
                        params.username, params.host, retry_count
                    );
                }
                Ok(handle)
            }
            Err(e) => {
                error!(
                    "SSH connection to {}@{} failed after {} attempt(s). Last error: {}",
                    params.username, params.host, total_attempts, e
                );
                Err(e)
            }
        }
    }

    /// Establish one SSH connection and authenticate.
    async fn connect_once(
        &self,
        params: &ConnectParams,
    ) -> Result<client::Handle<SshClientHandler>, TransportError> {
        let config = build_client_config(self.settings.compress);
        let timeout = self.settings.connect_timeout;

        let connect_future =
            client::connect(config, (params.host.as_str(), params.port), SshClientHandler);

        let mut handle = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason: e.to_string(),
            })?;

        let auth = PasswordAuth::new(&params.secret);
        debug!("Authenticating {} with {}", params.username, auth.name());

        if !auth.authenticate(&mut handle, &params.username).await? {
            return Err(TransportError::AuthenticationFailed {
                user: params.username.clone(),
            });
        }

        Ok(handle)
    }
}

#[async_trait]
impl ShellTransport for RusshTransport {
    async fn open_connection(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn ShellConnection>, TransportError> {
        let handle = self.connect_with_retry(params).await?;
        info!(
            "SSH connection established to {}@{}:{}",
            params.username, params.host, params.port
        );
        Ok(Box::new(RusshConnection {
            handle,
            output_limit: self.settings.output_limit,
        }))
    }
}

/// An authenticated russh connection.
pub struct RusshConnection {
    handle: client::Handle<SshClientHandler>,
    output_limit: usize,
}

#[async_trait]
impl ShellConnection for RusshConnection {
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, TransportError> {
        let channel = self.handle.channel_open_session().await?;

        channel
            .request_pty(
                false,
                TERMINAL_TYPE,
                TERMINAL_COLUMNS,
                TERMINAL_ROWS,
                0,
                0,
                &[],
            )
            .await?;
        channel.request_shell(false).await?;

        let (read_half, write_half) = channel.split();

        let output = Arc::new(Mutex::new(OutputBuffer::new(self.output_limit)));
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Open);
        let cancel_token = CancellationToken::new();

        tokio::spawn(pump_output(
            read_half,
            output.clone(),
            status_tx,
            cancel_token.clone(),
        ));

        Ok(Box::new(RusshShellChannel {
            writer: write_half,
            output,
            status_rx,
            cancel_token,
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Whether the remote side still has the shell channel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelStatus {
    Open,
    Closed,
}

/// Move shell output into the shared buffer until the channel ends.
async fn pump_output(
    mut read_half: ChannelReadHalf,
    output: Arc<Mutex<OutputBuffer>>,
    status_tx: watch::Sender<ChannelStatus>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                debug!("Shell reader cancelled");
                break;
            }

            msg = read_half.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    output.lock().await.extend(&data);
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    output.lock().await.extend(&data);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("Shell channel closed by remote side");
                    break;
                }
                Some(_) => {}
            }
        }
    }

    let _ = status_tx.send(ChannelStatus::Closed);
}

/// Shell channel whose output is collected by a background task.
pub struct RusshShellChannel {
    writer: ChannelWriteHalf<client::Msg>,
    output: Arc<Mutex<OutputBuffer>>,
    status_rx: watch::Receiver<ChannelStatus>,
    cancel_token: CancellationToken,
}

impl RusshShellChannel {
    fn is_closed(&self) -> bool {
        *self.status_rx.borrow() == ChannelStatus::Closed
    }
}

#[async_trait]
impl ShellChannel for RusshShellChannel {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        self.writer.data(data).await?;
        Ok(())
    }

    async fn poll_readable(&self) -> Result<bool, TransportError> {
        let buffered = !self.output.lock().await.is_empty();
        // Output that arrived before the close is still handed out
        if !buffered && self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        Ok(buffered)
    }

    async fn read_available(&self) -> Result<Vec<u8>, TransportError> {
        let (bytes, dropped) = self.output.lock().await.take();
        if dropped > 0 {
            warn!(dropped, "Unread shell output exceeded the buffer limit, oldest bytes dropped");
        }
        Ok(bytes)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.cancel_token.cancel();
        if self.is_closed() {
            return Ok(());
        }
        self.writer.close().await?;
        Ok(())
    }
}

impl Drop for RusshShellChannel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
