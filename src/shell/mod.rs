//! Remote shell session manager.
//!
//! This module is organized into the following submodules:
//!
//! - `channel`: Transport traits and connect parameters
//! - `client`: russh implementation of the transport traits
//! - `auth`: Authentication strategies
//! - `buffer`: Bounded buffer for unread shell output
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error types and retry classification
//! - `sanitizer`: Escape stripping and prompt removal
//! - `completion`: Command completion protocol (prompt sentinel)
//! - `executor`: Send, poll and collect loop for one command
//! - `session`: Per-user session state machine
//! - `storage`: Session storage abstraction
//! - `registry`: User id to session mapping

pub(crate) mod auth;
pub mod buffer;
pub mod channel;
pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod registry;
pub mod sanitizer;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ConnectParams, ShellChannel, ShellConnection, ShellTransport};
pub use client::RusshTransport;
pub use completion::{CompletionProtocol, PromptSentinel};
pub use config::{ConnectSettings, SessionConfig};
pub use error::{SessionError, TransportError};
pub use executor::ExecutionOutcome;
pub use registry::SessionRegistry;
pub use session::{Session, SessionInfo, SessionState, SessionStatus, ToggleOutcome};
