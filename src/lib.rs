pub mod chat;
pub mod shell;
