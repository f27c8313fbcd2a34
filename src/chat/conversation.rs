//! Multi-step parameter collection.
//!
//! `/connect` asks for host, port, username and password one message at a
//! time; `/execute` asks for one command. Each answer advances the
//! conversation until a complete request exists.

use crate::shell::ConnectParams;
use crate::shell::config::DEFAULT_SSH_PORT;

use super::messages;

/// Where a user is in an ongoing conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    AwaitingHost,
    AwaitingPort {
        host: String,
    },
    AwaitingUsername {
        host: String,
        port: u16,
    },
    AwaitingPassword {
        host: String,
        port: u16,
        username: String,
    },
    AwaitingCommand,
}

/// What to do after an answer.
#[derive(Debug)]
pub enum Step {
    /// Ask the next question and keep the conversation going
    Ask(Conversation, &'static str),
    /// All connection parameters collected
    Connect(ConnectParams),
    /// The command to run once
    Execute(String),
}

impl Conversation {
    /// Feed one answer into the conversation.
    pub fn advance(self, input: &str) -> Step {
        let answer = input.trim();
        match self {
            Conversation::AwaitingHost => Step::Ask(
                Conversation::AwaitingPort {
                    host: answer.to_string(),
                },
                messages::ASK_PORT,
            ),
            Conversation::AwaitingPort { host } => Step::Ask(
                Conversation::AwaitingUsername {
                    host,
                    port: parse_port(answer),
                },
                messages::ASK_USERNAME,
            ),
            Conversation::AwaitingUsername { host, port } => Step::Ask(
                Conversation::AwaitingPassword {
                    host,
                    port,
                    username: answer.to_string(),
                },
                messages::ASK_PASSWORD,
            ),
            Conversation::AwaitingPassword {
                host,
                port,
                username,
            } => Step::Connect(ConnectParams::new(host, port, username, answer)),
            Conversation::AwaitingCommand => Step::Execute(answer.to_string()),
        }
    }
}

/// Port from user input; anything that is not a valid port means 22.
pub fn parse_port(input: &str) -> u16 {
    input
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_SSH_PORT)
}
