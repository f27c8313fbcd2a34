//! Chat front end on top of the session registry.
//!
//! [`ShellBot`] turns inbound user text into registry calls and formats the
//! results. The `on_*` methods are the front-end boundary; [`ShellBot::handle`]
//! adds command parsing and the `/connect` and `/execute` conversations.
//!
//! Connects are awaited in place, so a user's later messages (including
//! `/disconnect`) see the finished connect. Command executions run on
//! spawned tasks, so the caller can keep feeding messages: a second command
//! for the same user then gets a busy reply instead of queueing behind the
//! first.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::shell::{ConnectParams, SessionError, SessionRegistry, SessionState, ToggleOutcome};

use super::command::{BotCommand, Inbound, classify};
use super::conversation::{Conversation, Step};
use super::messages::{self, StatusMessageBuilder};

/// One outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub user_id: String,
    pub text: String,
}

/// Where replies are delivered.
pub type ReplySink = mpsc::UnboundedSender<Reply>;

fn send(replies: &ReplySink, user_id: &str, text: impl Into<String>) {
    let reply = Reply {
        user_id: user_id.to_string(),
        text: text.into(),
    };
    if replies.send(reply).is_err() {
        debug!(user_id, "Reply dropped, sink closed");
    }
}

pub struct ShellBot {
    registry: Arc<SessionRegistry>,
    conversations: DashMap<String, Conversation>,
}

impl ShellBot {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            conversations: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Current conversation of a user, if any.
    pub fn conversation(&self, user_id: &str) -> Option<Conversation> {
        self.conversations
            .get(user_id)
            .map(|entry| entry.value().clone())
    }

    pub async fn on_connect_request(
        &self,
        user_id: &str,
        params: ConnectParams,
    ) -> Result<String, String> {
        match self.registry.connect(user_id, params).await {
            Ok(info) => Ok(messages::connected(&info)),
            Err(e) => Err(messages::session_error(&e)),
        }
    }

    pub async fn on_execute_request(&self, user_id: &str, command: &str) -> String {
        match self.registry.execute(user_id, command).await {
            Ok(outcome) => {
                debug!(
                    user_id,
                    command_id = %outcome.command_id,
                    timed_out = outcome.timed_out,
                    raw_bytes = outcome.raw_bytes,
                    "Command finished in {:?}",
                    outcome.elapsed
                );
                messages::command_output(&outcome.output)
            }
            Err(e) => messages::session_error(&e),
        }
    }

    pub async fn on_toggle_interactive(&self, user_id: &str) -> String {
        match self.registry.toggle_off(user_id).await {
            Ok(ToggleOutcome::TurnedOff) => messages::INTERACTIVE_OFF.to_string(),
            Ok(ToggleOutcome::AlreadyOff) => messages::INTERACTIVE_ALREADY_OFF.to_string(),
            Err(e) => messages::session_error(&e),
        }
    }

    pub async fn on_disconnect_request(&self, user_id: &str) -> String {
        match self.registry.disconnect(user_id).await {
            Ok(()) => messages::DISCONNECTED.to_string(),
            Err(SessionError::NotConnected) => messages::NOTHING_TO_DISCONNECT.to_string(),
            Err(e) => messages::session_error(&e),
        }
    }

    /// Run freeform text as a command when the user is in interactive mode.
    ///
    /// Returns `None` (no reply at all) otherwise.
    pub async fn on_freeform_message(&self, user_id: &str, text: &str) -> Option<String> {
        if !self.registry.is_interactive(user_id) {
            debug!(user_id, "Ignoring freeform text outside interactive mode");
            return None;
        }
        Some(self.on_execute_request(user_id, text.trim()).await)
    }

    /// Handle one inbound message.
    ///
    /// Returns the handle of the task spawned for an execution, if any.
    pub async fn handle(
        self: &Arc<Self>,
        user_id: &str,
        text: &str,
        replies: &ReplySink,
    ) -> Option<JoinHandle<()>> {
        match classify(text) {
            Inbound::Command(command) => {
                let aborted = self.conversations.remove(user_id).is_some();
                if aborted && command != BotCommand::Cancel {
                    debug!(user_id, "Conversation aborted by /{}", command.name());
                }
                self.run_command(user_id, command, aborted, replies).await
            }
            Inbound::UnknownCommand(name) => {
                send(replies, user_id, messages::unknown_command(name));
                None
            }
            Inbound::Text(text) => match self.conversations.remove(user_id) {
                Some((_, conversation)) => {
                    self.continue_conversation(user_id, conversation, text, replies)
                        .await
                }
                None => self.spawn_freeform(user_id, text, replies),
            },
        }
    }

    async fn run_command(
        self: &Arc<Self>,
        user_id: &str,
        command: BotCommand,
        aborted: bool,
        replies: &ReplySink,
    ) -> Option<JoinHandle<()>> {
        let text = match command {
            BotCommand::Start => messages::WELCOME.to_string(),
            BotCommand::Help => messages::HELP.to_string(),
            BotCommand::Connect => {
                self.conversations
                    .insert(user_id.to_string(), Conversation::AwaitingHost);
                messages::ASK_HOST.to_string()
            }
            BotCommand::Execute => {
                let connected = self
                    .registry
                    .status(user_id)
                    .is_some_and(|status| status.state == SessionState::Connected);
                if connected {
                    self.conversations
                        .insert(user_id.to_string(), Conversation::AwaitingCommand);
                    messages::ASK_COMMAND.to_string()
                } else {
                    messages::NOT_CONNECTED.to_string()
                }
            }
            BotCommand::Exit => self.on_toggle_interactive(user_id).await,
            BotCommand::Disconnect => self.on_disconnect_request(user_id).await,
            BotCommand::Cancel => {
                if aborted {
                    messages::CANCELLED.to_string()
                } else {
                    messages::NOTHING_TO_CANCEL.to_string()
                }
            }
            BotCommand::Status => {
                let session = self.registry.get(user_id);
                StatusMessageBuilder::new(session.as_ref().map(|s| s.status()))
                    .with_command_pending(session.is_some_and(|s| s.is_command_pending()))
                    .build()
            }
        };
        send(replies, user_id, text);
        None
    }

    async fn continue_conversation(
        self: &Arc<Self>,
        user_id: &str,
        conversation: Conversation,
        text: &str,
        replies: &ReplySink,
    ) -> Option<JoinHandle<()>> {
        match conversation.advance(text) {
            Step::Ask(next, question) => {
                self.conversations.insert(user_id.to_string(), next);
                send(replies, user_id, question);
                None
            }
            Step::Connect(params) => {
                send(replies, user_id, messages::CONNECTING);
                info!(user_id, "Connecting to {}:{}", params.host, params.port);

                let text = match self.on_connect_request(user_id, params).await {
                    Ok(text) | Err(text) => text,
                };
                send(replies, user_id, text);
                None
            }
            Step::Execute(command) => {
                send(replies, user_id, messages::EXECUTING);
                Some(self.spawn_execution(user_id, command, replies))
            }
        }
    }

    fn spawn_freeform(
        self: &Arc<Self>,
        user_id: &str,
        text: &str,
        replies: &ReplySink,
    ) -> Option<JoinHandle<()>> {
        if !self.registry.is_interactive(user_id) {
            debug!(user_id, "Ignoring freeform text outside interactive mode");
            return None;
        }
        Some(self.spawn_execution(user_id, text.trim().to_string(), replies))
    }

    fn spawn_execution(
        self: &Arc<Self>,
        user_id: &str,
        command: String,
        replies: &ReplySink,
    ) -> JoinHandle<()> {
        let bot = Arc::clone(self);
        let user_id = user_id.to_string();
        let replies = replies.clone();
        tokio::spawn(async move {
            let text = bot.on_execute_request(&user_id, &command).await;
            send(&replies, &user_id, text);
        })
    }
}
