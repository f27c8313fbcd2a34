//! Chat front end for the shell session manager.
//!
//! - `command`: Parsing of `/command` messages
//! - `conversation`: Step-by-step parameter collection
//! - `messages`: Reply texts and builders
//! - `bot`: The front-end boundary on top of the session registry
//! - `dispatch`: One ordered worker per user
//! - `stdio`: Line codec for the console binary

pub mod bot;
pub mod command;
pub mod conversation;
pub mod dispatch;
pub mod messages;
pub mod stdio;

pub use bot::{Reply, ReplySink, ShellBot};
pub use command::{BotCommand, Inbound};
pub use conversation::Conversation;
pub use dispatch::Dispatcher;
