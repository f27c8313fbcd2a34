//! Command execution on a persistent shell channel.
//!
//! ## Protocol
//!
//! 1. Send `command + "\n"`.
//! 2. Poll the channel: append whatever bytes are buffered and stop as soon
//!    as the completion protocol recognises its sentinel. Between polls the
//!    task sleeps for a fixed interval.
//! 3. Stop anyway when the timeout elapses or the cancellation token fires.
//! 4. Render the accumulated bytes through the protocol's sanitizer.
//!
//! ## Timeout Behavior
//!
//! A timeout is not an error: whatever arrived before the bound is rendered
//! and returned, so a slow command looks the same to the user as a fast
//! command with little output. `timed_out` is recorded on the outcome for
//! logging only.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::channel::ShellChannel;
use super::completion::CompletionProtocol;
use super::error::TransportError;

/// Bounds applied to a single execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Result of one command execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Identifier used to correlate log lines of this execution
    pub command_id: Uuid,
    /// Sanitized output
    pub output: String,
    /// Whether the bound elapsed before the prompt came back
    pub timed_out: bool,
    /// Whether a shutdown interrupted the wait
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Raw bytes collected from the channel
    pub raw_bytes: usize,
}

/// Run `command` on `channel` and collect its output.
///
/// Returns `Err` only for transport failures; the caller decides what a
/// broken channel means for the session.
pub async fn execute(
    channel: &dyn ShellChannel,
    command: &str,
    protocol: &dyn CompletionProtocol,
    limits: ExecutionLimits,
    cancel: &CancellationToken,
) -> Result<ExecutionOutcome, TransportError> {
    let command_id = Uuid::new_v4();
    debug!(%command_id, command, "Sending command to shell");

    channel.send(format!("{}\n", command).as_bytes()).await?;

    let started = Instant::now();
    let deadline = started + limits.timeout;
    let mut buffer: Vec<u8> = Vec::with_capacity(4096);
    let mut completed = false;
    let mut cancelled = false;

    loop {
        if channel.poll_readable().await? {
            let chunk = channel.read_available().await?;
            let searched = buffer.len();
            buffer.extend_from_slice(&chunk);
            if protocol.is_complete(&buffer, searched) {
                completed = true;
                break;
            }
        }

        if Instant::now() >= deadline {
            break;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }

            _ = tokio::time::sleep(limits.poll_interval) => {}
        }
    }

    let elapsed = started.elapsed();
    let timed_out = !completed && !cancelled;

    if timed_out {
        warn!(
            %command_id,
            "Prompt not seen within {:?}, returning partial output ({} bytes)",
            limits.timeout,
            buffer.len()
        );
    } else if cancelled {
        warn!(%command_id, "Command wait interrupted by shutdown");
    } else {
        debug!(%command_id, bytes = buffer.len(), ?elapsed, "Command completed");
    }

    Ok(ExecutionOutcome {
        command_id,
        output: protocol.render(&buffer, command),
        timed_out,
        cancelled,
        elapsed,
        raw_bytes: buffer.len(),
    })
}
