//! The chat runner: merge configuration sources, build the session, and
//! drive the terminal UI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use gabble::chat::{
    AesGcmCipher, ChatError, PacketCipher, Session, SessionOptions, UdpNetwork,
};
use gabble::chat::tui;
use gabble::config::{self, Config, FileStore, Store};

/// Top-level chat flags; running `gabble` with no subcommand uses these.
#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Your chat display name
    #[arg(long)]
    name: Option<String>,

    /// UDP address to listen on
    #[arg(long)]
    listen: Option<String>,

    /// Shared secret for end-to-end encryption
    #[arg(long)]
    secret: Option<String>,

    /// Path to the gabble config file
    #[arg(long, default_value_os_t = config::default_path())]
    config: PathBuf,

    /// Saved config profile to load
    #[arg(long)]
    group: Option<String>,

    /// Peer UDP address (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,
}

impl ChatArgs {
    pub fn execute(self) -> Result<()> {
        let (resolved, store) = self.resolve()?;
        let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
        rt.block_on(run_chat(resolved, store))
    }

    fn resolve(self) -> Result<(Config, Option<Arc<dyn Store>>)> {
        let store: Option<Arc<dyn Store>> = if self.config.as_os_str().is_empty() {
            None
        } else {
            Some(Arc::new(FileStore::open(&self.config).with_context(|| {
                format!("open config store {}", self.config.display())
            })?))
        };

        let profile = self.group.as_deref().unwrap_or("").trim();
        if store.is_none() && !profile.is_empty() {
            anyhow::bail!(
                "group {:?} requested but config {} not found",
                profile,
                self.config.display()
            );
        }

        let base = config::resolve_profile(store.as_deref(), profile)?;
        let overrides = Config {
            name: self.name.unwrap_or_default(),
            listen: self.listen.unwrap_or_default(),
            secret: self.secret.unwrap_or_default(),
            peers: self.peers,
        };
        let merged = config::normalize(config::merge(base, overrides));
        Ok((merged, store))
    }
}

/// `gabble with <profile>` - sugar for `gabble --group <profile>`.
#[derive(Args, Debug)]
pub struct WithCommand {
    /// Saved config profile to load
    profile: String,

    #[command(flatten)]
    chat: ChatArgs,
}

impl WithCommand {
    pub fn execute(self) -> Result<()> {
        let mut chat = self.chat;
        if chat.group.is_none() {
            chat.group = Some(self.profile);
        }
        chat.execute()
    }
}

async fn run_chat(cfg: Config, store: Option<Arc<dyn Store>>) -> Result<()> {
    let cipher: Option<Arc<dyn PacketCipher>> = if cfg.secret.is_empty() {
        None
    } else {
        Some(Arc::new(
            AesGcmCipher::new(&cfg.secret).context("setup error")?,
        ))
    };

    let session = Session::new(SessionOptions {
        config: cfg.clone(),
        cipher,
        store,
        network: Arc::new(UdpNetwork),
    })
    .await?;

    session.start().await;
    let ui = tui::run(&cfg.name, Arc::clone(&session)).await;
    session.shutdown().await;

    match ui {
        Ok(()) | Err(ChatError::Quit) => Ok(()),
        Err(err) => Err(anyhow::anyhow!(err).context("ui error")),
    }
}
