//! Slash-command handling and live reconfiguration.

use std::sync::Arc;

use crate::chat::cipher::{AesGcmCipher, PacketCipher};
use crate::chat::error::ChatError;
use crate::chat::message::MsgKind;
use crate::chat::session::Session;
use crate::config;

impl Session {
    pub(crate) async fn handle_input(&self, text: &str) -> Result<(), ChatError> {
        if text.is_empty() {
            return Ok(());
        }
        if text.starts_with('/') {
            return self.handle_command(text).await;
        }
        self.broadcast(MsgKind::Chat, text).await
    }

    async fn handle_command(&self, cmd: &str) -> Result<(), ChatError> {
        if cmd == "/peers" {
            let summary = self.peers_summary().await;
            self.emit_system(summary).await;
            return Ok(());
        }
        if cmd == "/quit" || cmd == "/exit" || cmd == "/q" {
            self.emit_system("goodbye").await;
            return Err(ChatError::Quit);
        }
        if cmd.starts_with("/group") {
            return self.save_group(cmd).await;
        }
        if cmd.starts_with("/peer") {
            return self.add_peers(cmd).await;
        }
        if cmd.starts_with("/switch") {
            let parts: Vec<&str> = cmd.split_whitespace().collect();
            if parts.len() != 2 {
                self.emit_system("usage: /switch <config>").await;
                return Ok(());
            }
            if self.store.is_none() {
                self.emit_system("config switching is not available").await;
                return Ok(());
            }
            return self.switch_config(parts[1]).await;
        }
        self.emit_system(format!("unknown command {cmd:?}")).await;
        Ok(())
    }

    async fn save_group(&self, cmd: &str) -> Result<(), ChatError> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        if parts.len() != 2 {
            self.emit_system("usage: /group <name>").await;
            return Ok(());
        }
        let Some(store) = &self.store else {
            self.emit_system("config saving is not available").await;
            return Ok(());
        };
        let group_name = parts[1];
        let active = self.members.active_addrs(&[]).await;
        let pending = self.members.pending_addrs().await;
        let cfg = self.cfg.read().await.clone();
        let snapshot = config::snapshot(&cfg.name, &cfg.listen, &cfg.secret, &[active, pending]);
        match store.save(group_name, snapshot.clone()) {
            Err(err) => {
                self.emit_system(format!("failed to save config: {err}"))
                    .await
            }
            Ok(()) => {
                self.emit_system(format!(
                    "saved config {group_name:?} with {} peers",
                    snapshot.peers.len()
                ))
                .await
            }
        }
        Ok(())
    }

    async fn add_peers(&self, cmd: &str) -> Result<(), ChatError> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        if parts.len() < 2 {
            self.emit_system("usage: /peer <address> [address...]").await;
            return Ok(());
        }

        let mut contacted = 0;
        for raw in &parts[1..] {
            let addr = match self.network.resolve(raw).await {
                Ok(addr) => addr,
                Err(err) => {
                    self.emit_system(format!("failed to resolve {raw}: {err}"))
                        .await;
                    continue;
                }
            };
            self.mark_pending(addr).await;
            let payload = self.build_join_payload().await;
            if let Err(err) = self.send_direct(addr, MsgKind::Join, &payload).await {
                self.emit_system(format!("failed to reach {raw}: {err}")).await;
                self.drop_peer(addr, &format!("failed: {err}")).await;
                continue;
            }
            self.mark_active(addr, "").await;
            contacted += 1;
        }

        if contacted > 0 {
            self.emit_system(format!("sent join to {contacted} peer(s)"))
                .await;
        }
        Ok(())
    }

    /// Apply a named profile to the running session without rebinding.
    ///
    /// Refuses when the profile's listen differs from the running
    /// listener; everything else - secret, name, peer set - is swapped in
    /// place after a best-effort leave to the current peers.
    pub(crate) async fn switch_config(&self, name: &str) -> Result<(), ChatError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.emit_system("usage: /switch <config>").await;
            return Ok(());
        }

        let cfg = match config::resolve_profile(self.store.as_deref(), trimmed) {
            Ok(cfg) => cfg,
            Err(err) => {
                self.emit_system(format!("failed to load config {trimmed:?}: {err}"))
                    .await;
                return Ok(());
            }
        };

        let current = self.cfg.read().await.clone();
        if !cfg.listen.is_empty() && cfg.listen != current.listen {
            self.emit_system(format!(
                "config {trimmed:?} uses listen {}; restart required to apply (current {})",
                cfg.listen, current.listen
            ))
            .await;
            return Ok(());
        }

        let new_cipher: Option<Arc<dyn PacketCipher>> = if cfg.secret.is_empty() {
            None
        } else {
            match AesGcmCipher::new(&cfg.secret) {
                Ok(cipher) => Some(Arc::new(cipher)),
                Err(err) => {
                    self.emit_system(format!("config {trimmed:?} secret rejected: {err}"))
                        .await;
                    return Ok(());
                }
            }
        };

        let mut resolved = Vec::new();
        for peer in &cfg.peers {
            match self.network.resolve(peer).await {
                Ok(addr) => resolved.push(addr),
                Err(err) => {
                    self.emit_system(format!("config {trimmed:?} skipping {peer}: {err}"))
                        .await;
                }
            }
        }

        if !self.members.active_addrs(&[]).await.is_empty() {
            if let Err(err) = self.broadcast(MsgKind::Leave, "").await {
                self.emit_system(format!("failed to send leave notice: {err}"))
                    .await;
            }
        }

        let prev_secret = current.secret.clone();
        self.cfg.write().await.secret = cfg.secret.clone();
        self.transport.set_cipher(new_cipher);
        self.transport.set_name(&cfg.name);

        if prev_secret.is_empty() != cfg.secret.is_empty() {
            if cfg.secret.is_empty() {
                self.emit_system("encryption disabled").await;
            } else {
                self.emit_system("encryption enabled").await;
            }
        }

        if !cfg.name.is_empty() && cfg.name != current.name {
            self.cfg.write().await.name = cfg.name.clone();
            self.emit_prompt(&cfg.name).await;
            self.emit_system(format!("now chatting as {}", cfg.name)).await;
        }

        let local = self
            .transport
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let name_now = self.cfg.read().await.name.clone();
        self.members.reset(&local, &name_now).await;
        *self.bootstrap.write().await = resolved.clone();

        let payload = self.build_join_payload().await;
        let mut contacted = 0;
        for addr in &resolved {
            self.mark_pending(*addr).await;
            if let Err(err) = self.send_direct(*addr, MsgKind::Join, &payload).await {
                self.emit_system(format!("failed to reach {addr}: {err}")).await;
                self.drop_peer(*addr, &format!("failed: {err}")).await;
                continue;
            }
            self.mark_active(*addr, "").await;
            contacted += 1;
        }
        if contacted == 0 && !resolved.is_empty() {
            if let Err(err) = self.broadcast(MsgKind::Join, &payload).await {
                self.emit_system(format!("failed to announce presence: {err}"))
                    .await;
            }
        }

        if resolved.is_empty() {
            self.emit_system(format!(
                "switched to {trimmed:?} with no peers; waiting for connections"
            ))
            .await;
        } else {
            self.emit_system(format!(
                "switched to {trimmed:?} with {} peer(s)",
                resolved.len()
            ))
            .await;
        }
        let summary = config::summary(&cfg);
        if !summary.is_empty() {
            self.emit_system(summary.join("\n")).await;
        }
        *self.cfg.write().await = cfg;
        self.record_event(format!("switched to {trimmed:?}"));

        Ok(())
    }

    /// A human summary of active/pending peers and the encryption state.
    pub(crate) async fn peers_summary(&self) -> String {
        let (active_members, pending_members) = self.members.snapshot().await;
        let active = format_member_addrs(&active_members);
        let pending = format_member_addrs(&pending_members);

        let mut lines = vec![
            format!("active ({}): {}", active.len(), summarize_list(&active)),
            format!("pending ({}): {}", pending.len(), summarize_list(&pending)),
        ];
        let state = if self.transport.encryption_enabled() {
            "enabled"
        } else {
            "disabled"
        };
        lines.push(format!("encryption: {state}"));
        let last = self.last_event();
        if !last.is_empty() {
            lines.push(format!("last event: {last}"));
        }
        lines.join("\n")
    }
}

fn format_member_addrs(members: &[crate::chat::membership::Member]) -> Vec<String> {
    let mut list: Vec<String> = members
        .iter()
        .map(|member| {
            if member.name.is_empty() {
                member.addr.clone()
            } else {
                format!("{} ({})", member.addr, member.name)
            }
        })
        .collect();
    list.sort();
    list
}

fn summarize_list(items: &[String]) -> String {
    match items.len() {
        0 => "none".to_string(),
        1 => items[0].clone(),
        2 => items.join(", "),
        n => format!("{}, {} (+{} more)", items[0], items[1], n - 2),
    }
}
