//! Per-user shell session lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Disconnected --connect ok--> Connected (interactive = true)
//! Disconnected --connect err-> Disconnected
//! Connected    --disconnect--> Disconnected
//! Connected    --transport error during execute--> Disconnected
//! ```
//!
//! `Connecting` is visible only while a connect attempt is in progress.
//!
//! # Serialization
//!
//! The connection and its shell channel live together behind one async
//! mutex. Every operation that touches them takes the mutex, so connect,
//! execute, toggle and disconnect of one user form a FIFO queue. On top of
//! that, `command_pending` rejects a second `execute` with
//! [`SessionError::Busy`] instead of letting it wait behind the first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::{ConnectParams, ShellChannel, ShellConnection, ShellTransport};
use super::completion::CompletionProtocol;
use super::config::SessionConfig;
use super::error::{SessionError, TransportError};
use super::executor::{self, ExecutionLimits, ExecutionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Metadata of the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// RFC 3339 timestamp of when the shell became usable
    pub connected_at: String,
}

/// Snapshot of a session's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub interactive: bool,
    pub info: Option<SessionInfo>,
}

impl SessionStatus {
    fn disconnected() -> Self {
        Self {
            state: SessionState::Disconnected,
            interactive: false,
            info: None,
        }
    }
}

/// Result of turning interactive mode off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    TurnedOff,
    AlreadyOff,
}

/// The connection and the shell channel opened on it.
struct ShellLink {
    connection: Box<dyn ShellConnection>,
    channel: Box<dyn ShellChannel>,
}

impl ShellLink {
    /// Close the channel, then the connection. Errors are logged only.
    async fn release(self, session_id: &str) {
        if let Err(e) = self.channel.close().await {
            warn!(session_id, "Error closing shell channel: {}", e);
        }
        if let Err(e) = self.connection.close().await {
            warn!(session_id, "Error closing SSH connection: {}", e);
        }
    }
}

/// Clears the pending flag when the execution ends, however it ends.
struct PendingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One user's shell session.
pub struct Session {
    id: String,
    transport: Arc<dyn ShellTransport>,
    protocol: Arc<dyn CompletionProtocol>,
    config: SessionConfig,
    /// Interrupts polling on shutdown
    cancel_token: CancellationToken,
    status_tx: watch::Sender<SessionStatus>,
    status_rx: watch::Receiver<SessionStatus>,
    command_pending: AtomicBool,
    link: Mutex<Option<ShellLink>>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn ShellTransport>,
        protocol: Arc<dyn CompletionProtocol>,
        config: SessionConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(SessionStatus::disconnected());
        Self {
            id: id.into(),
            transport,
            protocol,
            config,
            cancel_token,
            status_tx,
            status_rx,
            command_pending: AtomicBool::new(false),
            link: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.status_rx.borrow().state
    }

    pub fn is_interactive(&self) -> bool {
        self.status_rx.borrow().interactive
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.status_rx.borrow().info.clone()
    }

    pub fn is_command_pending(&self) -> bool {
        self.command_pending.load(Ordering::Acquire)
    }

    /// Open a connection and a shell, replacing any existing one.
    ///
    /// `params` (and with it the secret) is dropped when this returns. Once
    /// the session's token is cancelled no link is kept: a connect that
    /// finishes after the cancel closes what it opened.
    pub async fn connect(&self, params: ConnectParams) -> Result<SessionInfo, SessionError> {
        let mut link = self.link.lock().await;

        if let Some(old) = link.take() {
            info!(session_id = %self.id, "Replacing existing shell session");
            old.release(&self.id).await;
        }

        if self.cancel_token.is_cancelled() {
            self.mark_disconnected();
            return Err(SessionError::ShuttingDown);
        }

        self.status_tx.send_modify(|status| {
            status.state = SessionState::Connecting;
            status.interactive = false;
            status.info = None;
        });

        match self.establish(&params).await {
            Ok(new_link) if self.cancel_token.is_cancelled() => {
                info!(session_id = %self.id, "Shutdown during connect, closing new shell");
                new_link.release(&self.id).await;
                self.mark_disconnected();
                Err(SessionError::ShuttingDown)
            }
            Ok(new_link) => {
                *link = Some(new_link);
                let info = SessionInfo {
                    host: params.host.clone(),
                    port: params.port,
                    username: params.username.clone(),
                    connected_at: Utc::now().to_rfc3339(),
                };
                self.status_tx.send_modify(|status| {
                    status.state = SessionState::Connected;
                    status.interactive = true;
                    status.info = Some(info.clone());
                });
                info!(
                    session_id = %self.id,
                    "Shell session ready on {}@{}:{}",
                    info.username, info.host, info.port
                );
                Ok(info)
            }
            Err(e) => {
                self.mark_disconnected();
                warn!(session_id = %self.id, "Connect failed: {}", e);
                Err(SessionError::ConnectFailure(e.to_string()))
            }
        }
    }

    async fn establish(&self, params: &ConnectParams) -> Result<ShellLink, TransportError> {
        let connection = self.transport.open_connection(params).await?;

        let channel = match connection.open_shell().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(session_id = %self.id, "Error closing SSH connection: {}", close_err);
                }
                return Err(e);
            }
        };

        let link = ShellLink {
            connection,
            channel,
        };
        if let Err(e) = self.install_protocol(link.channel.as_ref()).await {
            link.release(&self.id).await;
            return Err(e);
        }
        Ok(link)
    }

    /// Send the protocol setup command and discard the login banner once.
    async fn install_protocol(&self, channel: &dyn ShellChannel) -> Result<(), TransportError> {
        channel
            .send(self.protocol.setup_command().as_bytes())
            .await?;
        tokio::time::sleep(self.config.settle_delay).await;

        if channel.poll_readable().await? {
            let banner = channel.read_available().await?;
            debug!(session_id = %self.id, bytes = banner.len(), "Discarded shell banner");
        }
        Ok(())
    }

    /// Run one command and return its output.
    ///
    /// A broken channel tears the session down and is reported as
    /// [`SessionError::ConnectionLost`].
    pub async fn execute(&self, command: &str) -> Result<ExecutionOutcome, SessionError> {
        let _pending = PendingGuard::acquire(&self.command_pending).ok_or(SessionError::Busy)?;

        let mut link = self.link.lock().await;
        let Some(active) = link.as_ref() else {
            return Err(SessionError::NotConnected);
        };

        let limits = ExecutionLimits {
            timeout: self.config.command_timeout,
            poll_interval: self.config.poll_interval,
        };

        let result = executor::execute(
            active.channel.as_ref(),
            command,
            self.protocol.as_ref(),
            limits,
            &self.cancel_token,
        )
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(session_id = %self.id, "Shell channel failed, tearing down session: {}", e);
                if let Some(broken) = link.take() {
                    broken.release(&self.id).await;
                }
                self.mark_disconnected();
                Err(SessionError::ConnectionLost(e))
            }
        }
    }

    /// Turn interactive mode off.
    pub async fn toggle_off(&self) -> Result<ToggleOutcome, SessionError> {
        let link = self.link.lock().await;
        if link.is_none() {
            return Err(SessionError::NotConnected);
        }

        let mut outcome = ToggleOutcome::AlreadyOff;
        self.status_tx.send_modify(|status| {
            if status.interactive {
                status.interactive = false;
                outcome = ToggleOutcome::TurnedOff;
            }
        });
        Ok(outcome)
    }

    /// Close the channel, then the connection.
    ///
    /// Waits for a pending command to finish first.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut link = self.link.lock().await;
        let Some(active) = link.take() else {
            return Err(SessionError::NotConnected);
        };

        active.release(&self.id).await;
        self.mark_disconnected();
        info!(session_id = %self.id, "Shell session disconnected");
        Ok(())
    }

    fn mark_disconnected(&self) {
        self.status_tx.send_replace(SessionStatus::disconnected());
    }
}
