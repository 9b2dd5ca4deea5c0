//! End-to-end session tests over an in-memory datagram network.
//!
//! Every scenario runs real sessions wired to an injected transport, so
//! the full gossip path - framing, dedup, encryption, membership,
//! forwarding - is exercised without touching the OS network stack.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use gabble::chat::{
    AesGcmCipher, EventStream, Message, MsgKind, Network, PacketCipher, PacketSocket, Session,
    SessionOptions,
};
use gabble::config::{self, Config, FileStore, Store};

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct Registry {
    routes: StdMutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
}

/// An in-memory datagram fabric. Sockets deliver instantly; sends to
/// unbound addresses vanish, like UDP.
#[derive(Default)]
struct MemoryNetwork {
    registry: Arc<Registry>,
}

impl MemoryNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn listen(&self, addr: &str) -> io::Result<Arc<dyn PacketSocket>> {
        let local: SocketAddr = addr
            .trim()
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad listen address"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.registry.routes.lock().unwrap();
        if routes.contains_key(&local) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
        }
        routes.insert(local, tx);
        Ok(Arc::new(MemorySocket {
            local,
            rx: Mutex::new(rx),
            registry: Arc::clone(&self.registry),
        }))
    }

    async fn resolve(&self, addr: &str) -> io::Result<SocketAddr> {
        addr.trim()
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad peer address"))
    }
}

struct MemorySocket {
    local: SocketAddr,
    rx: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    registry: Arc<Registry>,
}

#[async_trait]
impl PacketSocket for MemorySocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket closed")),
        }
    }

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let routes = self.registry.routes.lock().unwrap();
        if let Some(tx) = routes.get(&addr) {
            let _ = tx.send((buf.to_vec(), self.local));
        }
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

/// Wraps a socket so its first read fails with a transient error.
struct FlakySocket {
    inner: Arc<dyn PacketSocket>,
    failed: AtomicBool,
}

#[async_trait]
impl PacketSocket for FlakySocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read fault"));
        }
        self.inner.recv_from(buf).await
    }

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, addr).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

struct FlakyNetwork {
    inner: Arc<MemoryNetwork>,
}

#[async_trait]
impl Network for FlakyNetwork {
    async fn listen(&self, addr: &str) -> io::Result<Arc<dyn PacketSocket>> {
        let socket = self.inner.listen(addr).await?;
        Ok(Arc::new(FlakySocket {
            inner: socket,
            failed: AtomicBool::new(false),
        }))
    }

    async fn resolve(&self, addr: &str) -> io::Result<SocketAddr> {
        self.inner.resolve(addr).await
    }
}

async fn spawn_node(
    network: Arc<dyn Network>,
    name: &str,
    listen: &str,
    peers: &[&str],
    secret: &str,
    store: Option<Arc<dyn Store>>,
) -> Arc<Session> {
    let cfg = Config {
        name: name.to_string(),
        listen: listen.to_string(),
        secret: secret.to_string(),
        peers: peers.iter().map(|p| p.to_string()).collect(),
    };
    let cipher: Option<Arc<dyn PacketCipher>> = if secret.is_empty() {
        None
    } else {
        Some(Arc::new(AesGcmCipher::new(secret).expect("cipher")))
    };
    Session::new(SessionOptions {
        config: cfg,
        cipher,
        store,
        network,
    })
    .await
    .expect("session init")
}

async fn wait_for(events: &EventStream, what: &str, pred: impl Fn(&Message) -> bool) -> Message {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.next().await {
                Some(msg) if pred(&msg) => return msg,
                Some(_) => continue,
                None => panic!("event stream closed while waiting for {what}"),
            }
        }
    })
    .await;
    match result {
        Ok(msg) => msg,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

async fn wait_active(session: &Session, expect: &[&str]) {
    let expect: Vec<String> = expect.iter().map(|s| s.to_string()).collect();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let active = session.active_peers().await;
        if active == expect {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "peers did not converge: have {active:?}, want {expect:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Collect events until the stream has been quiet for `quiet`.
async fn drain(events: &EventStream, quiet: Duration) -> Vec<Message> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout(quiet, events.next()).await {
            Ok(Some(msg)) => out.push(msg),
            Ok(None) | Err(_) => return out,
        }
    }
}

#[tokio::test]
async fn test_two_node_join() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4001", &[], "", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4002",
        &["127.0.0.1:4001"],
        "",
        None,
    )
    .await;
    let a_events = a.events();

    a.start().await;
    b.start().await;

    let joined = wait_for(&a_events, "bob's join", |m| {
        m.kind == MsgKind::Join && m.from == "bob"
    })
    .await;
    assert!(
        joined.body.is_empty(),
        "membership digest must not leak to the UI"
    );

    wait_active(&a, &["127.0.0.1:4002"]).await;
    wait_active(&b, &["127.0.0.1:4001"]).await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_empty_bootstrap_waits_quietly() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4011", &[], "", None).await;
    let a_events = a.events();
    a.start().await;

    wait_for(&a_events, "the no-peers notice", |m| {
        m.kind == MsgKind::System && m.body.contains("no peers provided")
    })
    .await;
    assert!(a.active_peers().await.is_empty());
    a.shutdown().await;
}

#[tokio::test]
async fn test_transitive_discovery() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4021", &[], "", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4022",
        &["127.0.0.1:4021"],
        "",
        None,
    )
    .await;
    a.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4022"]).await;

    // C knows only A; A's peers digest hints it at B.
    let c = spawn_node(
        net.clone(),
        "carol",
        "127.0.0.1:4023",
        &["127.0.0.1:4021"],
        "",
        None,
    )
    .await;
    let b_events = b.events();
    c.start().await;

    // B hears about C through the direct join C sends after the hint.
    wait_for(&b_events, "carol's join at bob", |m| {
        m.kind == MsgKind::Join && m.from == "carol"
    })
    .await;

    // One gossip round from B confirms the B<->C link in both directions.
    b.submit("ping").await.unwrap();

    wait_active(&a, &["127.0.0.1:4022", "127.0.0.1:4023"]).await;
    wait_active(&b, &["127.0.0.1:4021", "127.0.0.1:4023"]).await;
    wait_active(&c, &["127.0.0.1:4021", "127.0.0.1:4022"]).await;

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_loop_suppression_delivers_exactly_once() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4031", &[], "", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4032",
        &["127.0.0.1:4031"],
        "",
        None,
    )
    .await;
    a.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4032"]).await;

    let c = spawn_node(
        net.clone(),
        "carol",
        "127.0.0.1:4033",
        &["127.0.0.1:4031"],
        "",
        None,
    )
    .await;
    c.start().await;
    // b learns of c through a's forward of the join
    wait_active(&b, &["127.0.0.1:4031", "127.0.0.1:4033"]).await;
    // one gossip round from b confirms the b<->c link, completing the mesh
    b.submit("warm-up").await.unwrap();
    wait_active(&c, &["127.0.0.1:4031", "127.0.0.1:4032"]).await;

    let b_events = b.events();
    let c_events = c.events();
    // flush everything emitted so far
    drain(&b_events, Duration::from_millis(200)).await;
    drain(&c_events, Duration::from_millis(200)).await;

    a.submit("hello").await.unwrap();

    let b_seen = drain(&b_events, Duration::from_millis(300)).await;
    let c_seen = drain(&c_events, Duration::from_millis(300)).await;
    let b_hellos = b_seen
        .iter()
        .filter(|m| m.kind == MsgKind::Chat && m.body == "hello")
        .count();
    let c_hellos = c_seen
        .iter()
        .filter(|m| m.kind == MsgKind::Chat && m.body == "hello")
        .count();
    assert_eq!(b_hellos, 1, "bob must see the chat exactly once");
    assert_eq!(c_hellos, 1, "carol must see the chat exactly once");

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_encryption_mismatch_is_rejected() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4041", &[], "s", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4042",
        &["127.0.0.1:4041"],
        "",
        None,
    )
    .await;
    let a_events = a.events();
    let b_events = b.events();

    a.start().await;
    b.start().await;

    // B's plaintext join is refused; the refusal reaches both UIs.
    let b_err = wait_for(&b_events, "the rejection at bob", |m| {
        m.kind == MsgKind::Error
    })
    .await;
    assert_eq!(b_err.body, "encryption required");
    wait_for(&a_events, "the rejection notice at alice", |m| {
        m.kind == MsgKind::Error && m.body == "encryption required"
    })
    .await;

    // B drops A after the error; A never activated B.
    wait_active(&b, &[]).await;
    wait_active(&a, &[]).await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_encrypted_chat_roundtrip() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4051", &[], "k", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4052",
        &["127.0.0.1:4051"],
        "k",
        None,
    )
    .await;
    let a_events = a.events();

    a.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4052"]).await;

    b.submit("sealed hello").await.unwrap();
    let chat = wait_for(&a_events, "the sealed chat", |m| m.kind == MsgKind::Chat).await;
    assert_eq!(chat.body, "sealed hello", "body must arrive decrypted");
    assert_eq!(chat.from, "bob");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_switch_hot_reload() {
    let net = MemoryNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("gabble.json")).unwrap());
    store
        .save(
            "prod",
            Config {
                name: "xena".into(),
                listen: "127.0.0.1:4061".into(),
                secret: "k".into(),
                peers: vec!["127.0.0.1:4063".into()],
            },
        )
        .unwrap();

    let x = spawn_node(
        net.clone(),
        "x",
        "127.0.0.1:4061",
        &[],
        "",
        Some(store.clone()),
    )
    .await;
    let p = spawn_node(
        net.clone(),
        "pat",
        "127.0.0.1:4062",
        &["127.0.0.1:4061"],
        "",
        None,
    )
    .await;
    let z = spawn_node(net.clone(), "zoe", "127.0.0.1:4063", &[], "k", None).await;

    let x_events = x.events();
    let p_events = p.events();
    let z_events = z.events();

    x.start().await;
    p.start().await;
    z.start().await;
    wait_active(&x, &["127.0.0.1:4062"]).await;

    x.submit("/switch prod").await.unwrap();

    // previous peer got the leave and forgot us
    wait_for(&p_events, "the leave at pat", |m| {
        m.kind == MsgKind::Leave && m.from == "x"
    })
    .await;
    wait_active(&p, &[]).await;

    // encryption toggled on, prompt updated, new peer contacted
    wait_for(&x_events, "the encryption notice", |m| {
        m.kind == MsgKind::System && m.body == "encryption enabled"
    })
    .await;
    wait_for(&x_events, "the prompt update", |m| {
        m.kind == MsgKind::Prompt && m.body == "xena"
    })
    .await;
    wait_for(&z_events, "the encrypted join at zoe", |m| {
        m.kind == MsgKind::Join && m.from == "xena"
    })
    .await;

    wait_active(&x, &["127.0.0.1:4063"]).await;
    wait_active(&z, &["127.0.0.1:4061"]).await;

    x.shutdown().await;
    p.shutdown().await;
    z.shutdown().await;
}

#[tokio::test]
async fn test_switch_to_empty_secret_disables_encryption_once() {
    let net = MemoryNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("gabble.json")).unwrap());
    store
        .save(
            "plain",
            Config {
                name: "x".into(),
                listen: "127.0.0.1:4065".into(),
                ..Default::default()
            },
        )
        .unwrap();

    let x = spawn_node(
        net.clone(),
        "x",
        "127.0.0.1:4065",
        &[],
        "k",
        Some(store.clone()),
    )
    .await;
    let x_events = x.events();
    x.start().await;

    x.submit("/switch plain").await.unwrap();

    let seen = drain(&x_events, Duration::from_millis(200)).await;
    let notices = seen
        .iter()
        .filter(|m| m.kind == MsgKind::System && m.body == "encryption disabled")
        .count();
    assert_eq!(notices, 1, "the toggle notice is emitted exactly once");
    x.shutdown().await;
}

#[tokio::test]
async fn test_bind_failure_surfaces_at_init() {
    let net = MemoryNetwork::new();
    let _a = spawn_node(net.clone(), "alice", "127.0.0.1:4068", &[], "", None).await;

    let cfg = Config {
        name: "bob".into(),
        listen: "127.0.0.1:4068".into(),
        ..Default::default()
    };
    let result = Session::new(SessionOptions {
        config: cfg,
        cipher: None,
        store: None,
        network: net.clone(),
    })
    .await;
    assert!(
        matches!(result, Err(gabble::chat::ChatError::Bind { .. })),
        "binding an occupied address must fail session init"
    );
}

#[tokio::test]
async fn test_switch_refuses_listen_change() {
    let net = MemoryNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("gabble.json")).unwrap());
    store
        .save(
            "elsewhere",
            Config {
                listen: "127.0.0.1:9999".into(),
                ..Default::default()
            },
        )
        .unwrap();

    let x = spawn_node(
        net.clone(),
        "x",
        "127.0.0.1:4071",
        &[],
        "",
        Some(store),
    )
    .await;
    let x_events = x.events();
    x.start().await;

    x.submit("/switch elsewhere").await.unwrap();
    wait_for(&x_events, "the refusal", |m| {
        m.kind == MsgKind::System && m.body.contains("restart required")
    })
    .await;
    x.shutdown().await;
}

#[tokio::test]
async fn test_transient_read_error_keeps_listening() {
    let net = MemoryNetwork::new();
    let flaky = Arc::new(FlakyNetwork { inner: net.clone() });

    let a = spawn_node(flaky, "alice", "127.0.0.1:4081", &[], "", None).await;
    let a_events = a.events();
    a.start().await;

    wait_for(&a_events, "the read error notice", |m| {
        m.kind == MsgKind::System && m.body.contains("read error")
    })
    .await;

    // the listener survived; a later join is processed normally
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4082",
        &["127.0.0.1:4081"],
        "",
        None,
    )
    .await;
    b.start().await;
    wait_for(&a_events, "bob's join after the fault", |m| {
        m.kind == MsgKind::Join && m.from == "bob"
    })
    .await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_start_and_shutdown_are_idempotent() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4091", &[], "", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4092",
        &["127.0.0.1:4091"],
        "",
        None,
    )
    .await;
    let a_events = a.events();

    a.start().await;
    b.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4092"]).await;

    b.shutdown().await;
    b.shutdown().await;

    wait_for(&a_events, "bob's leave", |m| {
        m.kind == MsgKind::Leave && m.from == "bob"
    })
    .await;
    wait_active(&a, &[]).await;

    // b's stream terminates once the buffered events drain
    let b_events = b.events();
    drain(&b_events, Duration::from_millis(200)).await;
    let trailing = tokio::time::timeout(Duration::from_millis(200), b_events.next()).await;
    assert!(
        matches!(trailing, Ok(None)),
        "stream must end after shutdown"
    );

    a.shutdown().await;
}

#[tokio::test]
async fn test_event_queue_drops_oldest_when_full() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4141", &[], "", None).await;
    a.start().await;

    // nobody is consuming: overflow must evict the oldest events
    for i in 0..150 {
        a.submit(&format!("msg {i}")).await.unwrap();
    }

    let events = a.events();
    let seen = drain(&events, Duration::from_millis(100)).await;
    assert!(seen.len() <= 128, "queue is bounded at 128");
    assert_eq!(
        seen.last().expect("events present").body,
        "msg 149",
        "newest event must survive"
    );
    assert!(
        !seen.iter().any(|m| m.body.contains("listening on")),
        "startup notices were the oldest and must be gone"
    );
    a.shutdown().await;
}

#[tokio::test]
async fn test_quit_command_shuts_down() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4101", &[], "", None).await;
    let a_events = a.events();
    a.start().await;

    let result = a.submit("/quit").await;
    assert!(matches!(result, Err(gabble::chat::ChatError::Quit)));

    // the goodbye was emitted before the queue closed
    let seen = drain(&a_events, Duration::from_millis(200)).await;
    assert!(seen
        .iter()
        .any(|m| m.kind == MsgKind::System && m.body == "goodbye"));

    // subsequent submits are inert
    a.submit("anything").await.unwrap();
}

#[tokio::test]
async fn test_peer_command_connects() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4111", &[], "", None).await;
    let b = spawn_node(net.clone(), "bob", "127.0.0.1:4112", &[], "", None).await;
    let a_events = a.events();
    let b_events = b.events();
    a.start().await;
    b.start().await;

    a.submit("/peer 127.0.0.1:4112").await.unwrap();

    wait_for(&a_events, "the contact summary", |m| {
        m.kind == MsgKind::System && m.body.contains("sent join to 1 peer(s)")
    })
    .await;
    wait_for(&b_events, "alice's join at bob", |m| {
        m.kind == MsgKind::Join && m.from == "alice"
    })
    .await;
    wait_active(&b, &["127.0.0.1:4111"]).await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_group_command_saves_runtime_state() {
    let net = MemoryNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("gabble.json")).unwrap());

    let a = spawn_node(
        net.clone(),
        "alice",
        "127.0.0.1:4121",
        &[],
        "",
        Some(store.clone()),
    )
    .await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4122",
        &["127.0.0.1:4121"],
        "",
        None,
    )
    .await;
    a.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4122"]).await;

    a.submit("/group work").await.unwrap();

    let saved = store.load("work").expect("profile saved");
    assert_eq!(saved.name, "alice");
    assert!(saved.peers.contains(&"127.0.0.1:4122".to_string()));

    // reserved name is refused through the same path
    let a_events = a.events();
    a.submit("/group default").await.unwrap();
    wait_for(&a_events, "the reserved-name refusal", |m| {
        m.kind == MsgKind::System && m.body.contains("failed to save config")
    })
    .await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_peers_command_summarizes() {
    let net = MemoryNetwork::new();
    let a = spawn_node(net.clone(), "alice", "127.0.0.1:4131", &[], "", None).await;
    let b = spawn_node(
        net.clone(),
        "bob",
        "127.0.0.1:4132",
        &["127.0.0.1:4131"],
        "",
        None,
    )
    .await;
    let a_events = a.events();
    a.start().await;
    b.start().await;
    wait_active(&a, &["127.0.0.1:4132"]).await;

    a.submit("/peers").await.unwrap();
    let summary = wait_for(&a_events, "the peers summary", |m| {
        m.kind == MsgKind::System && m.body.contains("active (")
    })
    .await;
    assert!(summary.body.contains("127.0.0.1:4132"));
    assert!(summary.body.contains("encryption: disabled"));

    a.submit("/bogus").await.unwrap();
    wait_for(&a_events, "the unknown-command notice", |m| {
        m.kind == MsgKind::System && m.body.contains("unknown command")
    })
    .await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_normalize_addr_laws() {
    // normalize . normalize == normalize, over a spread of inputs
    for input in [
        "127.0.0.1:4000",
        "0.0.0.0:9",
        "[::1]:80",
        " 10.1.2.3:5 ",
        "garbage",
    ] {
        let once = gabble::chat::canonical_addr(input);
        let twice = gabble::chat::canonical_addr(&once);
        assert_eq!(once, twice, "canonicalisation must be idempotent");
    }
}

#[tokio::test]
async fn test_store_resolution_matches_cli_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("gabble.json")).unwrap();
    store
        .save_default(Config {
            name: "base".into(),
            peers: vec!["a:1".into()],
            ..Default::default()
        })
        .unwrap();
    store
        .save(
            "team",
            Config {
                peers: vec!["b:2".into()],
                ..Default::default()
            },
        )
        .unwrap();

    let resolved = config::resolve_profile(Some(&store), "team").unwrap();
    assert_eq!(resolved.name, "base");
    assert_eq!(resolved.peers, vec!["a:1".to_string(), "b:2".to_string()]);
}
