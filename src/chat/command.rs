//! Parsing of inbound chat text into bot commands.
//!
//! A command is a leading `/word`, optionally addressed to a bot with an
//! `@botname` suffix (`/connect@my_bot`). Anything after the command word is
//! ignored; parameters are collected by the conversation that follows.

/// The commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Connect,
    Execute,
    /// Turn interactive mode off
    Exit,
    Disconnect,
    Cancel,
    Status,
}

impl BotCommand {
    /// Every command, in menu order.
    pub const ALL: [BotCommand; 8] = [
        BotCommand::Start,
        BotCommand::Help,
        BotCommand::Connect,
        BotCommand::Execute,
        BotCommand::Exit,
        BotCommand::Disconnect,
        BotCommand::Cancel,
        BotCommand::Status,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Help => "help",
            BotCommand::Connect => "connect",
            BotCommand::Execute => "execute",
            BotCommand::Exit => "exit",
            BotCommand::Disconnect => "disconnect",
            BotCommand::Cancel => "cancel",
            BotCommand::Status => "status",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }
}

/// Classification of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    Command(BotCommand),
    /// A `/word` the bot does not know; carries the word without the slash
    UnknownCommand(&'a str),
    /// Anything that is not a command, untrimmed
    Text(&'a str),
}

/// Classify a message.
pub fn classify(text: &str) -> Inbound<'_> {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Inbound::Text(text);
    };

    let word = rest.split(char::is_whitespace).next().unwrap_or("");
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        return Inbound::Text(text);
    }

    match BotCommand::from_name(name) {
        Some(command) => Inbound::Command(command),
        None => Inbound::UnknownCommand(name),
    }
}
