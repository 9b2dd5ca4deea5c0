//! CLI subcommand executors.

mod chat;
mod init;

pub use chat::{ChatArgs, WithCommand};
pub use init::InitCommand;
