//! Reply texts shown to chat users.
//!
//! Replies use the light Markdown that chat front ends render (`*bold*`,
//! backticks and fenced blocks); a plain console shows them as-is.

use crate::shell::{SessionError, SessionInfo, SessionState, SessionStatus};

pub const WELCOME: &str = "*Welcome to the SSH Shell Bot!*\n\n\
Use /connect to open a persistent SSH session, /execute to run a command, \
or /disconnect to close the session.\n\
For detailed instructions, send /help.";

pub const HELP: &str = "*Usage Instructions:*\n\n\
• `/connect` – Start a conversation to establish a persistent SSH session. \
You will be asked for the hostname, port (default is 22), username, and password.\n\n\
• `/execute` – Once connected, run a command on the remote server. The bot will return the output.\n\n\
• Interactive mode – After connecting, every plain message is run as a command.\n\n\
• `/exit` – Turn interactive mode off. The session stays connected.\n\n\
• `/status` – Show the current session.\n\n\
• `/disconnect` – Close the persistent SSH session.\n\n\
• `/cancel` – Abort the current conversation.";

pub const ASK_HOST: &str =
    "🔌 *Connect to SSH*\n\nEnter the SSH server hostname (e.g., `your.server.com`):";
pub const ASK_PORT: &str = "Enter port number (default is `22`):";
pub const ASK_USERNAME: &str = "Enter SSH username:";
pub const ASK_PASSWORD: &str = "Enter SSH password:";
pub const CONNECTING: &str = "Connecting to the SSH server, please wait...";

pub const ASK_COMMAND: &str =
    "💻 *Execute Command*\n\nEnter the command you want to run on the server:";
pub const EXECUTING: &str = "⏳ Executing your command, please wait...";

pub const NOT_CONNECTED: &str = "⚠️ No active SSH connection. Please use /connect first.";
pub const NOTHING_TO_DISCONNECT: &str = "⚠️ No active SSH connection to disconnect.";
pub const DISCONNECTED: &str = "🔌 SSH connection closed.";

pub const CANCELLED: &str = "❌ Operation cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

pub const INTERACTIVE_OFF: &str =
    "Interactive mode is off. Use /execute to run commands, or /connect to reconnect.";
pub const INTERACTIVE_ALREADY_OFF: &str = "Interactive mode is already off.";

pub const BUSY: &str = "⏳ A command is still running. Please wait for its output.";
pub const SHUTTING_DOWN: &str = "The bot is shutting down.";

pub fn connected(info: &SessionInfo) -> String {
    format!(
        "✅ *Connected successfully!* Your session to {}@{}:{} is now persistent.\n\
         Interactive mode is on: plain messages run as commands. Send /exit to turn it off.",
        info.username, info.host, info.port
    )
}

pub fn connect_failed(reason: &str) -> String {
    format!("❌ *Failed to connect:* {}", reason)
}

/// Command output in a fenced block.
pub fn command_output(output: &str) -> String {
    format!("*Command output:*\n```\n{}\n```", output)
}

pub fn unknown_command(name: &str) -> String {
    format!("Unknown command `/{}`. Send /help for the list of commands.", name)
}

/// Reply for a failed session operation.
pub fn session_error(error: &SessionError) -> String {
    match error {
        SessionError::NotConnected => NOT_CONNECTED.to_string(),
        SessionError::Busy => BUSY.to_string(),
        SessionError::ShuttingDown => SHUTTING_DOWN.to_string(),
        SessionError::ConnectFailure(reason) => connect_failed(reason),
        SessionError::ConnectionLost(cause) => format!(
            "⚠️ *Connection lost:* {}\nThe session was closed. Use /connect to start a new one.",
            cause
        ),
    }
}

/// Builder for `/status` replies.
///
/// # Example
///
/// ```ignore
/// let message = StatusMessageBuilder::new(status)
///     .with_command_pending(true)
///     .build();
/// ```
pub struct StatusMessageBuilder {
    status: Option<SessionStatus>,
    command_pending: bool,
}

impl StatusMessageBuilder {
    /// `None` means the user never had a session.
    pub fn new(status: Option<SessionStatus>) -> Self {
        Self {
            status,
            command_pending: false,
        }
    }

    pub fn with_command_pending(mut self, pending: bool) -> Self {
        self.command_pending = pending;
        self
    }

    pub fn build(&self) -> String {
        let Some(status) = &self.status else {
            return "No session yet. Use /connect to open one.".to_string();
        };

        let state = match status.state {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };

        let mut lines = vec![format!("*Session status:* {}", state)];
        if let Some(info) = &status.info {
            lines.push(format!("• host: {}@{}:{}", info.username, info.host, info.port));
            lines.push(format!("• connected_at: {}", info.connected_at));
        }
        if status.state == SessionState::Connected {
            let mode = if status.interactive { "on" } else { "off" };
            lines.push(format!("• interactive: {}", mode));
        }
        if self.command_pending {
            lines.push("• a command is running".to_string());
        }

        lines.join("\n")
    }
}
