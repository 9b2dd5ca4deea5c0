//! Interactive creation of the default configuration profile.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gabble::config::{self, Config, FileStore, Store};

/// Prompt for the default profile and save it.
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Path to the gabble config file
    #[arg(long, default_value_os_t = config::default_path())]
    config: PathBuf,
}

impl InitCommand {
    pub fn execute(self) -> Result<()> {
        let store = FileStore::open(&self.config).context("open config store")?;
        let current = config::resolve_profile(Some(&store), "")?;

        let stdin = io::stdin();
        let mut reader = stdin.lock();

        let name = prompt(&mut reader, "Display name", &current.name)?;
        let listen = prompt(&mut reader, "Listen address", &current.listen)?;
        let secret = prompt_secret(&mut reader, &current.secret)?;
        let peers_joined = current.peers.join(", ");
        let peers_raw = prompt(
            &mut reader,
            "Bootstrap peers (comma separated)",
            &peers_joined,
        )?;
        let peers = parse_peers(&peers_raw);

        let snapshot = Config {
            name,
            listen,
            secret,
            peers,
        };
        store
            .save_default(snapshot.clone())
            .context("save default config")?;

        println!("Saved default configuration to {}", self.config.display());
        for line in config::summary(&snapshot) {
            println!("{line}");
        }
        Ok(())
    }
}

fn prompt(reader: &mut impl BufRead, label: &str, current: &str) -> Result<String> {
    if current.is_empty() {
        print!("{label}: ");
    } else {
        print!("{label} [{current}]: ");
    }
    io::stdout().flush()?;

    let mut input = String::new();
    reader.read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        return Ok(current.to_string());
    }
    Ok(input.to_string())
}

fn prompt_secret(reader: &mut impl BufRead, current: &str) -> Result<String> {
    if current.is_empty() {
        print!("Shared secret (leave blank for none): ");
    } else {
        print!("Shared secret [set] (blank to keep, type 'none' to disable): ");
    }
    io::stdout().flush()?;

    let mut input = String::new();
    reader.read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        return Ok(current.to_string());
    }
    if input.eq_ignore_ascii_case("none") {
        return Ok(String::new());
    }
    Ok(input.to_string())
}

fn parse_peers(raw: &str) -> Vec<String> {
    let lists = vec![raw.split(',').map(str::to_string).collect::<Vec<_>>()];
    config::merge_peers(&lists)
}
