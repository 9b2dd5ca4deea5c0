//! Packet framing, deduplication, and authenticated encryption.
//!
//! The transport owns the datagram socket, the seen-id set used for loop
//! suppression, and the cipher/name pair that `/switch` may swap at
//! runtime. One task runs the read loop; every accepted packet is handed
//! to the session on a fresh task so the loop is never blocked by
//! downstream work.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio_util::sync::CancellationToken;

use crate::chat::cipher::PacketCipher;
use crate::chat::error::ChatError;
use crate::chat::message::{Message, MsgKind};
use crate::chat::network::PacketSocket;

/// Maximum accepted datagram size.
const MAX_PACKET: usize = 4096;

/// How long a blocking read may sit before the stop signal is rechecked.
const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Callbacks the session registers for inbound traffic.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// A decoded envelope, its source, the original bytes, and whether it
    /// passed authentication.
    async fn handle(&self, msg: Message, addr: SocketAddr, raw: Vec<u8>, authenticated: bool);

    /// A rejection we sent back to a peer that failed authentication.
    async fn reject(&self, msg: Message, addr: SocketAddr);

    /// A transport-level notice for the UI.
    async fn notify(&self, text: String);
}

struct Shared {
    name: String,
    cipher: Option<Arc<dyn PacketCipher>>,
}

/// Encoding and network IO for one session.
pub struct Transport {
    socket: Arc<dyn PacketSocket>,
    seen: RwLock<HashSet<String>>,
    shared: RwLock<Shared>,
}

impl Transport {
    /// Wire up the socket and the optional cipher.
    pub fn new(
        name: &str,
        socket: Arc<dyn PacketSocket>,
        cipher: Option<Arc<dyn PacketCipher>>,
    ) -> Self {
        Self {
            socket,
            seen: RwLock::new(HashSet::new()),
            shared: RwLock::new(Shared {
                name: name.to_string(),
                cipher,
            }),
        }
    }

    /// The underlying socket's bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Whether a cipher is currently configured.
    pub fn encryption_enabled(&self) -> bool {
        self.shared
            .read()
            .expect("transport state lock poisoned")
            .cipher
            .is_some()
    }

    /// Swap the cipher used for subsequent messages.
    pub fn set_cipher(&self, cipher: Option<Arc<dyn PacketCipher>>) {
        self.shared
            .write()
            .expect("transport state lock poisoned")
            .cipher = cipher;
    }

    /// Update the sender name used in outbound messages.
    pub fn set_name(&self, name: &str) {
        self.shared
            .write()
            .expect("transport state lock poisoned")
            .name = name.to_string();
    }

    fn current_cipher(&self) -> Option<Arc<dyn PacketCipher>> {
        self.shared
            .read()
            .expect("transport state lock poisoned")
            .cipher
            .clone()
    }

    fn current_name(&self) -> String {
        self.shared
            .read()
            .expect("transport state lock poisoned")
            .name
            .clone()
    }

    /// Record an envelope id; returns false when it was already seen.
    fn remember(&self, id: &str) -> bool {
        self.seen
            .write()
            .expect("seen set lock poisoned")
            .insert(id.to_string())
    }

    /// Launch the read loop. It exits only when `stop` is cancelled;
    /// transient read errors are reported and reading continues.
    pub fn listen(self: &Arc<Self>, stop: CancellationToken, handler: Arc<dyn PacketHandler>) {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_PACKET];
            loop {
                let received =
                    tokio::time::timeout(READ_DEADLINE, transport.socket.recv_from(&mut buf))
                        .await;
                let (len, addr) = match received {
                    Err(_) => {
                        if stop.is_cancelled() {
                            return;
                        }
                        continue;
                    }
                    Ok(Err(err)) => {
                        if stop.is_cancelled() {
                            return;
                        }
                        handler.notify(format!("read error: {err}")).await;
                        continue;
                    }
                    Ok(Ok(pair)) => pair,
                };

                // copy out of the shared buffer before the next read
                let data = buf[..len].to_vec();

                let mut msg: Message = match serde_json::from_slice(&data) {
                    Ok(msg) => msg,
                    Err(_) => {
                        handler
                            .notify(format!("discarded malformed packet from {addr}"))
                            .await;
                        continue;
                    }
                };

                if !transport.remember(&msg.id) {
                    continue;
                }

                let authenticated = match transport.verify_and_decrypt(&mut msg) {
                    Ok(authenticated) => authenticated,
                    Err(reason) => {
                        match transport.compose_reject(reason) {
                            Ok((reject_msg, raw)) => {
                                if let Err(err) = transport.send_raw(addr, &raw).await {
                                    handler
                                        .notify(format!(
                                            "failed to send reject to {addr}: {err}"
                                        ))
                                        .await;
                                }
                                handler.reject(reject_msg, addr).await;
                            }
                            Err(err) => handler.notify(err.to_string()).await,
                        }
                        continue;
                    }
                };

                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle(msg, addr, data, authenticated).await;
                });
            }
        });
    }

    /// Assemble, seal, and marshal an outbound envelope. The id is
    /// recorded in the seen set so the sender ignores its own gossip.
    pub fn prepare(&self, kind: MsgKind, body: &str) -> Result<(Message, Vec<u8>), ChatError> {
        let mut msg = Message::new(kind, self.current_name(), body);

        if let Some(cipher) = self.current_cipher() {
            let (nonce, ciphertext) = cipher.encrypt(body.as_bytes())?;
            msg.cipher = BASE64.encode(ciphertext);
            msg.nonce = BASE64.encode(nonce);
            msg.body.clear();
        }

        let raw = serde_json::to_vec(&msg)?;
        self.remember(&msg.id);
        Ok((msg, raw))
    }

    /// Write one encoded packet to the given address.
    pub async fn send_raw(&self, addr: SocketAddr, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, addr).await.map(|_| ())
    }

    /// Synthesize the error envelope sent back to a peer that failed
    /// authentication.
    fn compose_reject(&self, reason: &str) -> Result<(Message, Vec<u8>), ChatError> {
        let msg = Message::new(MsgKind::Error, self.current_name(), reason);
        let raw = serde_json::to_vec(&msg)?;
        Ok((msg, raw))
    }

    /// Authenticate an inbound envelope and restore its plaintext body.
    ///
    /// Returns the authenticated flag on success, or the reason string to
    /// send back on rejection. `error` envelopes bypass all checks so the
    /// session can observe the explanation.
    fn verify_and_decrypt(&self, msg: &mut Message) -> Result<bool, &'static str> {
        if msg.kind == MsgKind::Error {
            return Ok(false);
        }

        let encrypted = msg.is_encrypted();
        let Some(cipher) = self.current_cipher() else {
            if encrypted {
                return Err("encryption required");
            }
            return Ok(true);
        };

        if !encrypted {
            return Err("encryption required");
        }

        let nonce = BASE64.decode(&msg.nonce).map_err(|_| "invalid nonce")?;
        let ciphertext = BASE64.decode(&msg.cipher).map_err(|_| "invalid ciphertext")?;
        let plain = cipher
            .decrypt(&nonce, &ciphertext)
            .map_err(|_| "authentication failed")?;
        msg.body = String::from_utf8_lossy(&plain).into_owned();
        Ok(true)
    }
}
