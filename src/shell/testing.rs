//! Scripted fakes for the transport traits.
//!
//! The fake shell answers each line it receives with a list of output
//! chunks. One chunk is released per `poll_readable` call, so an empty chunk
//! models a poll where nothing arrived yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::channel::{ConnectParams, ShellChannel, ShellConnection, ShellTransport};
use super::config::{DEFAULT_PROMPT_MARKER, SessionConfig};
use super::error::TransportError;

/// Marker used by every fake shell.
pub(crate) const MARKER: &str = DEFAULT_PROMPT_MARKER;

/// Session config with short delays so tests finish quickly.
pub(crate) fn fast_config() -> SessionConfig {
    SessionConfig {
        command_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(5),
        settle_delay: Duration::from_millis(1),
        prompt_marker: MARKER.to_string(),
    }
}

/// Output produced by the fake shell for one input line.
fn respond(line: &str) -> Vec<Vec<u8>> {
    let chunks: Vec<String> = if line.starts_with("export PS1=") {
        // Banner, echo and the new prompt arrive together before the settle
        // delay ends, so the single banner drain clears all of it
        vec![format!(
            "Welcome to fakehost\r\nLast login: never\r\n$ {line}\r\n{MARKER} "
        )]
    } else if line == "whoami" {
        vec!["whoami\r\n".to_string(), format!("alice\r\n{MARKER} ")]
    } else if line.starts_with("sleep") {
        // Never shows the prompt within any test timeout
        vec![format!("{line}\r\n"), "partial output\r\n".to_string()]
    } else if line == "split" {
        // The prompt marker arrives in two reads
        let (head, tail) = MARKER.split_at(MARKER.len() / 2);
        vec![format!("split\r\nout\r\n{head}"), format!("{tail} ")]
    } else if line == "slow" {
        vec![
            "slow\r\n".to_string(),
            String::new(),
            String::new(),
            "step 1\r\n".to_string(),
            String::new(),
            format!("step 2\r\n{MARKER} "),
        ]
    } else {
        vec![format!("{line}\r\n"), format!("ran {line}\r\n{MARKER} ")]
    };
    chunks.into_iter().map(String::into_bytes).collect()
}

/// Shared state of a fake shell channel, observable from tests.
#[derive(Default)]
pub(crate) struct FakeChannelState {
    buffer: Mutex<Vec<u8>>,
    pending: Mutex<VecDeque<Vec<u8>>>,
    broken: AtomicBool,
    ops_in_flight: AtomicUsize,
    pub max_ops_in_flight: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    pub close_calls: AtomicUsize,
    /// Delay applied to `send` so overlapping writers would be observable
    pub send_delay: Mutex<Duration>,
}

impl FakeChannelState {
    /// Make every further operation fail as if the remote side hung up.
    pub(crate) fn break_channel(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn enter(&self) -> Result<(), TransportError> {
        let now = self.ops_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_ops_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            self.ops_in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::ChannelClosed);
        }
        Ok(())
    }

    fn leave(&self) {
        self.ops_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeChannel {
    state: Arc<FakeChannelState>,
}

#[async_trait]
impl ShellChannel for FakeChannel {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.state.enter()?;
        let delay = *self.state.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let text = String::from_utf8_lossy(data).into_owned();
        for line in text.lines() {
            self.state.sent.lock().unwrap().push(line.to_string());
            if line == "exit" {
                self.state.break_channel();
            }
            self.state.pending.lock().unwrap().extend(respond(line));
        }

        self.state.leave();
        Ok(())
    }

    async fn poll_readable(&self) -> Result<bool, TransportError> {
        self.state.enter()?;
        let next = self.state.pending.lock().unwrap().pop_front();
        let mut buffer = self.state.buffer.lock().unwrap();
        if let Some(chunk) = next {
            buffer.extend_from_slice(&chunk);
        }
        let readable = !buffer.is_empty();
        drop(buffer);
        self.state.leave();
        Ok(readable)
    }

    async fn read_available(&self) -> Result<Vec<u8>, TransportError> {
        self.state.enter()?;
        let data = std::mem::take(&mut *self.state.buffer.lock().unwrap());
        self.state.leave();
        Ok(data)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared state of a fake connection.
#[derive(Default)]
pub(crate) struct FakeConnectionState {
    pub channel: Arc<FakeChannelState>,
    pub close_calls: AtomicUsize,
    pub fail_shell: AtomicBool,
    pub fail_close: AtomicBool,
}

pub(crate) struct FakeConnection {
    state: Arc<FakeConnectionState>,
}

#[async_trait]
impl ShellConnection for FakeConnection {
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, TransportError> {
        if self.state.fail_shell.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        Ok(Box::new(FakeChannel {
            state: self.state.channel.clone(),
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        Ok(())
    }
}

/// Transport handing out fake connections; failures can be queued.
#[derive(Default)]
pub(crate) struct FakeTransport {
    failures: Mutex<VecDeque<String>>,
    fail_shell_next: AtomicBool,
    fail_close_next: AtomicBool,
    pub connections: Mutex<Vec<Arc<FakeConnectionState>>>,
    pub attempts: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next connect attempt fail with `reason`.
    pub(crate) fn fail_next(&self, reason: &str) {
        self.failures.lock().unwrap().push_back(reason.to_string());
    }

    /// Make the next connection refuse to open a shell.
    pub(crate) fn fail_next_shell(&self) {
        self.fail_shell_next.store(true, Ordering::SeqCst);
    }

    /// Make closing the next connection report an error.
    pub(crate) fn fail_next_close(&self) {
        self.fail_close_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connection(&self, index: usize) -> Arc<FakeConnectionState> {
        self.connections.lock().unwrap()[index].clone()
    }

    pub(crate) fn last_connection(&self) -> Arc<FakeConnectionState> {
        let connections = self.connections.lock().unwrap();
        connections[connections.len() - 1].clone()
    }
}

#[async_trait]
impl ShellTransport for FakeTransport {
    async fn open_connection(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn ShellConnection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            return Err(TransportError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason,
            });
        }

        let state = Arc::new(FakeConnectionState::default());
        if self.fail_shell_next.swap(false, Ordering::SeqCst) {
            state.fail_shell.store(true, Ordering::SeqCst);
        }
        if self.fail_close_next.swap(false, Ordering::SeqCst) {
            state.fail_close.store(true, Ordering::SeqCst);
        }
        self.connections.lock().unwrap().push(state.clone());
        Ok(Box::new(FakeConnection { state }))
    }
}

/// A standalone fake channel for executor tests.
pub(crate) fn fake_channel() -> (Box<dyn ShellChannel>, Arc<FakeChannelState>) {
    let state = Arc::new(FakeChannelState::default());
    (
        Box::new(FakeChannel {
            state: state.clone(),
        }),
        state,
    )
}
