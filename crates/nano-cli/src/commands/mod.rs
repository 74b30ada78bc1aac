//! CLI commands.

pub mod chat;
pub mod extract;
pub mod info;
