//! Session orchestration: lifecycle, gossip dispatch, and the UI event
//! stream.
//!
//! A session is the lifetime of one bound listener and its membership
//! table. Start and shutdown are latched; the stop signal is a
//! cancellation token observed by the read loop within one read deadline.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::chat::cipher::PacketCipher;
use crate::chat::error::ChatError;
use crate::chat::membership::Membership;
use crate::chat::message::{Message, MsgKind};
use crate::chat::network::{Network, UdpNetwork};
use crate::chat::transport::{PacketHandler, Transport};
use crate::config::{self, Config, Store};

/// Capacity of the UI event queue. Overflow drops the oldest event so a
/// lagging UI can never stall the gossip dispatcher.
const EVENT_QUEUE: usize = 128;

/// Everything needed to initialise a session.
pub struct SessionOptions {
    /// Runtime configuration (normalised during init).
    pub config: Config,
    /// Optional packet cipher; `None` means plaintext envelopes.
    pub cipher: Option<Arc<dyn PacketCipher>>,
    /// Optional profile store backing `/group` and `/switch`.
    pub store: Option<Arc<dyn Store>>,
    /// The socket factory; tests inject an in-memory one.
    pub network: Arc<dyn Network>,
}

impl SessionOptions {
    /// Options for a real UDP session with no persistence.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cipher: None,
            store: None,
            network: Arc::new(UdpNetwork),
        }
    }
}

/// A cloneable handle on the session's event queue.
#[derive(Clone)]
pub struct EventStream {
    queue: Arc<EventQueue>,
}

impl EventStream {
    /// The next event, or `None` once the session has shut down and the
    /// queue has drained.
    pub async fn next(&self) -> Option<Message> {
        self.queue.pop().await
    }
}

/// Bounded ring of UI events. Overflow evicts the oldest entry inside
/// the producer's own critical section, so a parked consumer can never
/// force the newest event to be dropped instead.
struct EventQueue {
    inner: std::sync::Mutex<EventQueueState>,
    notify: Notify,
}

struct EventQueueState {
    buf: VecDeque<Message>,
    closed: bool,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(EventQueueState {
                buf: VecDeque::with_capacity(EVENT_QUEUE),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append an event, dropping the oldest entry when full. Pushes
    /// after close are silently ignored.
    fn push(&self, msg: Message) {
        {
            let mut state = self.inner.lock().expect("events lock poisoned");
            if state.closed {
                return;
            }
            if state.buf.len() >= EVENT_QUEUE {
                state.buf.pop_front();
            }
            state.buf.push_back(msg);
        }
        self.notify.notify_one();
    }

    /// Stop accepting events and wake every waiting consumer. Already
    /// buffered events remain readable.
    fn close(&self) {
        self.inner.lock().expect("events lock poisoned").closed = true;
        self.notify.notify_waiters();
    }

    async fn pop(&self) -> Option<Message> {
        loop {
            // register interest before checking, so a push between the
            // check and the await still wakes us
            let notified = self.notify.notified();
            {
                let mut state = self.inner.lock().expect("events lock poisoned");
                if let Some(msg) = state.buf.pop_front() {
                    return Some(msg);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

/// One chat session: the gossip loop, user interaction, and shutdown.
pub struct Session {
    pub(crate) cfg: RwLock<Config>,
    pub(crate) bootstrap: RwLock<Vec<SocketAddr>>,
    pub(crate) store: Option<Arc<dyn Store>>,
    pub(crate) transport: Arc<Transport>,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) members: Membership,
    pub(crate) closed: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
    events: Arc<EventQueue>,
    last_event: std::sync::RwLock<String>,
}

impl Session {
    /// Initialise a session: bind the listener, resolve every bootstrap
    /// peer (failure aborts), and emit the startup notices.
    pub async fn new(opts: SessionOptions) -> Result<Arc<Self>, ChatError> {
        let cfg = config::normalize(opts.config);

        let socket = opts
            .network
            .listen(&cfg.listen)
            .await
            .map_err(|source| ChatError::Bind {
                addr: cfg.listen.clone(),
                source,
            })?;
        let local_addr = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let transport = Arc::new(Transport::new(&cfg.name, socket, opts.cipher));
        let members = Membership::new(&local_addr, &cfg.name);

        let peers = cfg.peers.clone();
        let name = cfg.name.clone();

        let session = Arc::new(Session {
            cfg: RwLock::new(cfg),
            bootstrap: RwLock::new(Vec::new()),
            store: opts.store,
            transport,
            network: opts.network,
            members,
            closed: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            events: Arc::new(EventQueue::new()),
            last_event: std::sync::RwLock::new(String::new()),
        });

        for seed in &peers {
            let addr =
                session
                    .network
                    .resolve(seed)
                    .await
                    .map_err(|source| ChatError::Resolve {
                        addr: seed.clone(),
                        source,
                    })?;
            session.bootstrap.write().await.push(addr);
            session.mark_pending(addr).await;
        }

        session
            .emit(Message::system(format!(
                "listening on {local_addr} as {name}"
            )))
            .await;
        if peers.is_empty() {
            session
                .emit_system("no peers provided, waiting for someone to connect")
                .await;
        }
        if session.transport.encryption_enabled() {
            session.emit_system("encryption enabled").await;
        }
        session.record_event("session ready");
        Ok(session)
    }

    /// The event queue consumed by the UI renderer.
    pub fn events(&self) -> EventStream {
        EventStream {
            queue: Arc::clone(&self.events),
        }
    }

    /// The bound listener address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr().ok()
    }

    /// Sorted active peer addresses (excluding the local node).
    pub async fn active_peers(&self) -> Vec<String> {
        self.members.active_addrs(&[]).await
    }

    /// Sorted pending peer addresses.
    pub async fn pending_peers(&self) -> Vec<String> {
        self.members.pending_addrs().await
    }

    /// Launch the read loop and announce ourselves to the bootstrap set.
    /// Idempotent: only the first call has any effect.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let handler: Arc<dyn PacketHandler> = Arc::clone(self) as Arc<dyn PacketHandler>;
        self.transport.listen(self.closed.clone(), handler);

        let payload = self.build_join_payload().await;
        let bootstrap = self.bootstrap.read().await.clone();
        let mut sent_direct = false;
        for addr in bootstrap {
            self.mark_pending(addr).await;
            if let Err(err) = self.send_direct(addr, MsgKind::Join, &payload).await {
                self.emit_system(format!("bootstrap to {addr} failed: {err}"))
                    .await;
                self.drop_peer(addr, &format!("failed: {err}")).await;
                continue;
            }
            self.mark_active(addr, "").await;
            sent_direct = true;
        }
        if !sent_direct {
            if let Err(err) = self.broadcast(MsgKind::Join, &payload).await {
                self.emit_system(format!("failed to announce presence: {err}"))
                    .await;
            }
        }
    }

    /// Handle a line submitted by the UI: commands start with `/`,
    /// anything else is broadcast as chat. Blank input is ignored.
    pub async fn submit(self: &Arc<Self>, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.start().await;
        let result = self.handle_input(text).await;
        if matches!(result, Err(ChatError::Quit)) {
            self.shutdown().await;
        }
        result
    }

    /// Broadcast a best-effort leave, stop the read loop, and close the
    /// event queue. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.broadcast(MsgKind::Leave, "").await {
            self.emit_system(format!("failed to send leave notice: {err}"))
                .await;
        }
        self.close();
    }

    /// Signal the read loop to stop and close the event queue. Safe to
    /// call repeatedly.
    pub fn close(&self) {
        self.closed.cancel();
        self.events.close();
    }

    pub(crate) async fn emit(&self, msg: Message) {
        if self.closed.is_cancelled() {
            return;
        }
        self.events.push(msg);
    }

    pub(crate) async fn emit_system(&self, text: impl Into<String>) {
        self.emit(Message::system(text)).await;
    }

    pub(crate) async fn emit_prompt(&self, name: &str) {
        self.emit(Message::prompt(name)).await;
    }

    pub(crate) fn record_event(&self, text: impl Into<String>) {
        *self.last_event.write().expect("status lock poisoned") = text.into();
    }

    pub(crate) fn last_event(&self) -> String {
        self.last_event
            .read()
            .expect("status lock poisoned")
            .clone()
    }

    pub(crate) async fn mark_pending(&self, addr: SocketAddr) {
        let key = addr.to_string();
        if self.members.add_pending(&key).await {
            self.record_event(format!("contacting {key}"));
        }
    }

    pub(crate) async fn mark_active(&self, addr: SocketAddr, name: &str) -> bool {
        let key = addr.to_string();
        let transitioned = self.members.mark_active(&key, name).await;
        if transitioned {
            self.record_event(format!("connected {key}"));
        }
        transitioned
    }

    /// Demote or remove a peer, recording the reason as the last event.
    pub(crate) async fn drop_peer(&self, addr: SocketAddr, reason: &str) -> bool {
        let key = addr.to_string();
        let changed = if reason == "left the chat" {
            self.members.remove(&key).await
        } else {
            self.members.mark_failed(&key).await
        };
        if !changed {
            return false;
        }
        let event = if reason.is_empty() {
            format!("disconnected {key}")
        } else if reason.contains(&key) {
            reason.to_string()
        } else {
            format!("{key}: {reason}")
        };
        self.record_event(event);
        true
    }

    pub(crate) async fn build_join_payload(&self) -> String {
        self.members.build_join_payload().await.unwrap_or_default()
    }

    pub(crate) async fn send_direct(
        &self,
        addr: SocketAddr,
        kind: MsgKind,
        body: &str,
    ) -> Result<(), ChatError> {
        let (_, raw) = self.transport.prepare(kind, body)?;
        self.transport.send_raw(addr, &raw).await?;
        Ok(())
    }

    /// Prepare an envelope and fan it out to every active endpoint. A
    /// chat broadcast is also emitted locally with its plaintext body.
    pub(crate) async fn broadcast(&self, kind: MsgKind, body: &str) -> Result<(), ChatError> {
        let (msg, raw) = self.transport.prepare(kind, body)?;

        if kind == MsgKind::Chat {
            let mut local = msg;
            local.body = body.to_string();
            local.cipher.clear();
            local.nonce.clear();
            self.emit(local).await;
        }

        self.forward_raw(&raw, None).await;
        Ok(())
    }

    /// The gossip step: send the original bytes to every active endpoint
    /// except the source. A failed send demotes the peer; it never
    /// aborts the fan-out.
    pub(crate) async fn forward_raw(&self, data: &[u8], exclude: Option<SocketAddr>) {
        let exclude_key = exclude.map(|a| a.to_string());
        let targets = self.members.active_endpoints(exclude_key.as_deref()).await;
        for (key, endpoint) in targets {
            if let Err(err) = self.transport.send_raw(endpoint, data).await {
                self.emit_system(format!("send to {key} failed: {err}")).await;
                self.drop_peer(endpoint, &format!("failed: {err}")).await;
            }
        }
    }

    /// Pursue a membership hint: mark it pending, resolve it, cache the
    /// endpoint, and send a direct join. Failure drops the peer.
    pub(crate) async fn contact_peer(&self, addr: &str) {
        let addr = addr.trim();
        if addr.is_empty() || self.members.is_local(addr).await {
            return;
        }
        self.members.add_pending(addr).await;
        let resolved = match self.network.resolve(addr).await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.emit_system(format!("peer hint {addr} failed: {err}"))
                    .await;
                return;
            }
        };
        if self.members.is_local(&resolved.to_string()).await {
            return;
        }
        let payload = self.build_join_payload().await;
        self.mark_pending(resolved).await;
        self.members
            .set_endpoint(&resolved.to_string(), resolved)
            .await;
        if let Err(err) = self.send_direct(resolved, MsgKind::Join, &payload).await {
            self.emit_system(format!("failed to reach {resolved}: {err}"))
                .await;
            self.drop_peer(resolved, &format!("failed: {err}")).await;
        }
    }

    async fn handle_peers_payload(&self, body: &str, source: SocketAddr) {
        if body.trim().is_empty() {
            return;
        }
        let additional = match self
            .members
            .process_peers(body.as_bytes(), &source.to_string())
            .await
        {
            Ok(additional) => additional,
            Err(_) => return,
        };
        for target in additional {
            self.contact_peer(&target).await;
        }
    }
}

#[async_trait]
impl PacketHandler for Session {
    async fn handle(&self, msg: Message, addr: SocketAddr, raw: Vec<u8>, authenticated: bool) {
        let mut suppress_emit = false;
        let mut activated = false;

        match msg.kind {
            MsgKind::Peers => {
                self.handle_peers_payload(&msg.body, addr).await;
                return;
            }
            MsgKind::Join => {
                let payload = msg.body.trim();
                if !payload.is_empty() {
                    if let Ok(outcome) = self
                        .members
                        .process_join(payload.as_bytes(), &addr.to_string(), &msg.from)
                        .await
                    {
                        activated = outcome.activated;
                        if !outcome.response.is_empty() {
                            if let Err(err) =
                                self.send_direct(addr, MsgKind::Peers, &outcome.response).await
                            {
                                self.emit_system(format!(
                                    "failed to share peers with {addr}: {err}"
                                ))
                                .await;
                            }
                        }
                        for target in outcome.hinted {
                            self.contact_peer(&target).await;
                        }
                    }
                    // the peers response carries what the UI needs; the
                    // digest body itself is never shown
                    suppress_emit = true;
                }
            }
            _ => {}
        }

        if msg.kind == MsgKind::Error {
            self.drop_peer(addr, &msg.body).await;
            self.emit(msg).await;
            return;
        }

        if authenticated {
            if msg.kind == MsgKind::Leave && !msg.from.is_empty() {
                self.drop_peer(addr, "left the chat").await;
            } else if self.mark_active(addr, &msg.from).await {
                activated = true;
            }
        }

        if msg.kind == MsgKind::Join && activated {
            let mut join_copy = msg.clone();
            join_copy.body.clear();
            join_copy.cipher.clear();
            join_copy.nonce.clear();
            self.emit(join_copy).await;
            suppress_emit = true;
        }

        if !suppress_emit {
            self.emit(msg).await;
        }
        self.forward_raw(&raw, Some(addr)).await;
    }

    async fn reject(&self, msg: Message, addr: SocketAddr) {
        let reason = msg.body.clone();
        self.emit(msg).await;
        self.drop_peer(addr, &reason).await;
    }

    async fn notify(&self, text: String) {
        self.emit_system(text).await;
    }
}
