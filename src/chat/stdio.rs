//! Line codec for the console front end.
//!
//! # Input
//!
//! One message per line, in one of three forms:
//!
//! - `text` - sent by the default user (`CHAT_USER_ID`, `local` if unset)
//! - `@user text` - sent by `user`
//! - `{"user_id": "...", "text": "..."}` - JSON envelope
//!
//! # Output
//!
//! `[user] text` by default, or one JSON envelope per line when `CHAT_JSON`
//! is set. Multi-line replies stay on one JSON line; in text mode they span
//! several lines.

use std::env;

use serde::Deserialize;
use tracing::warn;

use crate::shell::config::resolve_flag;

use super::bot::Reply;

pub(crate) const USER_ID_ENV_VAR: &str = "CHAT_USER_ID";
pub(crate) const JSON_ENV_VAR: &str = "CHAT_JSON";

/// Default sender of plain lines.
pub const DEFAULT_USER_ID: &str = "local";

/// An inbound message decoded from one line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Console settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct StdioSettings {
    pub default_user: String,
    pub format: OutputFormat,
}

impl StdioSettings {
    pub fn from_env() -> Self {
        let default_user = env::var(USER_ID_ENV_VAR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        let format = if resolve_flag(JSON_ENV_VAR, false) {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        Self {
            default_user,
            format,
        }
    }
}

impl Default for StdioSettings {
    fn default() -> Self {
        Self {
            default_user: DEFAULT_USER_ID.to_string(),
            format: OutputFormat::Text,
        }
    }
}

/// Decode one input line. Blank lines yield `None`.
///
/// A line that looks like JSON but does not decode as an envelope is taken
/// as plain text.
pub fn parse_line(line: &str, default_user: &str) -> Option<InboundMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        match serde_json::from_str::<InboundMessage>(trimmed) {
            Ok(message) if !message.user_id.trim().is_empty() => return Some(message),
            Ok(_) => warn!("JSON line without user_id, treating as text"),
            Err(e) => warn!("Line is not a message envelope ({}), treating as text", e),
        }
    }

    if let Some(addressed) = trimmed.strip_prefix('@') {
        let (user, text) = addressed.split_once(char::is_whitespace)?;
        if user.is_empty() || text.trim().is_empty() {
            return None;
        }
        return Some(InboundMessage {
            user_id: user.to_string(),
            text: text.trim_start().to_string(),
        });
    }

    Some(InboundMessage {
        user_id: default_user.to_string(),
        text: line.to_string(),
    })
}

/// Encode one reply as output text, without a trailing newline.
pub fn render(reply: &Reply, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("[{}] {}", reply.user_id, reply.text),
        OutputFormat::Json => serde_json::to_string(reply)
            .unwrap_or_else(|_| format!("[{}] {}", reply.user_id, reply.text)),
    }
}
