//! gabble - peer-to-peer terminal chat over UDP gossip.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{ChatArgs, InitCommand, WithCommand};

/// Peer-to-peer terminal chat over UDP
///
/// Every node listens on a local port, optionally knows a few bootstrap
/// peers, and gossips messages across the mesh. A shared secret turns on
/// end-to-end AES-GCM encryption.
#[derive(Parser)]
#[command(name = "gabble")]
#[command(version)]
#[command(about = "Peer-to-peer terminal chat over UDP gossip")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactively create the default configuration profile
    Init(InitCommand),

    /// Run the chat with a saved profile
    With(WithCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init(cmd)) => cmd.execute(),
        Some(Commands::With(cmd)) => cmd.execute(),
        None => cli.chat.execute(),
    }
}
