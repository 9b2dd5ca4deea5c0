//! Membership: the single source of truth for known peers.
//!
//! Every peer is one record keyed by its canonical address. The local
//! node is always present as an active member and is never included in
//! outbound peer lists or forwarding fan-outs. All operations normalise
//! addresses first and refuse any that resolve to the local node.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::chat::netutil::normalize_addr;

/// Peer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Believed to exist, bidirectional exchange not yet confirmed.
    Pending,
    /// Successfully exchanged a message with, no leave or failure since.
    Active,
}

/// One known participant, keyed by canonical address.
#[derive(Debug, Clone)]
pub struct Member {
    /// Canonical address string; primary key, immutable.
    pub addr: String,
    /// Display name last advertised by the peer.
    pub name: String,
    /// Current lifecycle state.
    pub status: Status,
    /// Monotonic timestamp of the last status change.
    pub last_seen: Instant,
    endpoint: Option<SocketAddr>,
}

impl Member {
    fn new(addr: String, status: Status) -> Self {
        Self {
            addr,
            name: String::new(),
            status,
            last_seen: Instant::now(),
            endpoint: None,
        }
    }

    /// The last reachable endpoint used for sending, if cached.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// The lightweight advertising payload for this member.
    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            addr: self.addr.clone(),
            name: self.name.clone(),
        }
    }
}

/// Wire form of one member in join/peers payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Canonical (or advertised) address.
    pub addr: String,
    /// Display name, omitted when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JoinPayload {
    #[serde(default)]
    member: MemberInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    peers: Vec<MemberInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PeersPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    peers: Vec<MemberInfo>,
}

/// Result of integrating a join payload.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Encoded peers digest to send back to the joiner.
    pub response: String,
    /// Newly hinted addresses worth contacting.
    pub hinted: Vec<String>,
    /// Whether the joiner itself was newly promoted to active.
    pub activated: bool,
}

#[derive(Debug)]
struct Inner {
    local_addr: String,
    local_ip: Option<IpAddr>,
    local_port: u16,
    local_name: String,
    members: HashMap<String, Member>,
}

impl Inner {
    fn set_local(&mut self, addr: &str) {
        let canon = normalize_addr(addr, addr).unwrap_or_else(|| addr.trim().to_string());
        self.local_addr = canon.clone();
        self.local_ip = None;
        self.local_port = 0;
        let parsed = canon.parse::<SocketAddr>().ok();
        if let Some(ap) = parsed {
            self.local_ip = Some(ap.ip());
            self.local_port = ap.port();
        }

        if canon.is_empty() {
            return;
        }
        let member = self
            .members
            .entry(canon.clone())
            .or_insert_with(|| Member::new(canon, Status::Active));
        member.name = self.local_name.clone();
        member.status = Status::Active;
        member.last_seen = Instant::now();
        member.endpoint = parsed;
    }

    fn is_local(&self, addr: &str) -> bool {
        if addr.is_empty() || self.local_addr.is_empty() {
            return false;
        }
        if addr == self.local_addr {
            return true;
        }
        let Ok(ap) = addr.parse::<SocketAddr>() else {
            return false;
        };
        if self.local_port != 0 && ap.port() != self.local_port {
            return false;
        }
        let Some(local_ip) = self.local_ip else {
            return true;
        };
        if local_ip.is_unspecified() {
            return true;
        }
        if ap.ip() == local_ip {
            return true;
        }
        local_ip.is_loopback() && ap.ip().is_loopback()
    }

    fn active_infos(&self, exclude: &str) -> Vec<MemberInfo> {
        let exclude = exclude.trim();
        let mut infos: Vec<MemberInfo> = self
            .members
            .values()
            .filter(|m| m.status == Status::Active)
            .filter(|m| m.addr != exclude && m.addr != self.local_addr)
            .map(Member::info)
            .collect();
        infos.sort_by(|a, b| a.addr.cmp(&b.addr));
        infos
    }
}

/// The membership table, guarded by a single reader/writer lock.
#[derive(Debug)]
pub struct Membership {
    inner: RwLock<Inner>,
}

impl Membership {
    /// Create a table seeded with the local node as an active member.
    pub fn new(local_addr: &str, local_name: &str) -> Self {
        let mut inner = Inner {
            local_addr: String::new(),
            local_ip: None,
            local_port: 0,
            local_name: local_name.to_string(),
            members: HashMap::new(),
        };
        inner.set_local(local_addr);
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Rebuild the table atomically: empty map, fresh local entry.
    pub async fn reset(&self, local_addr: &str, local_name: &str) {
        let mut inner = self.inner.write().await;
        inner.members = HashMap::new();
        inner.local_name = local_name.to_string();
        inner.set_local(local_addr);
    }

    /// Reapply the local member metadata after a name change.
    pub async fn update_local_name(&self, name: &str) {
        let mut inner = self.inner.write().await;
        inner.local_name = name.to_string();
        let addr = inner.local_addr.clone();
        inner.set_local(&addr);
    }

    /// The advertising payload for the local participant.
    pub async fn local_info(&self) -> MemberInfo {
        let inner = self.inner.read().await;
        MemberInfo {
            addr: inner.local_addr.clone(),
            name: inner.local_name.clone(),
        }
    }

    /// Whether the address resolves to this node.
    ///
    /// True when the canonical forms match, or when the ports match and
    /// the local IP is unspecified, equal, or both sides are loopback.
    pub async fn is_local(&self, raw: &str) -> bool {
        let addr = normalize_addr(raw, raw).unwrap_or_else(|| raw.trim().to_string());
        self.inner.read().await.is_local(&addr)
    }

    /// Record a member hint in the pending state.
    ///
    /// Inserts if absent; demotes Active to Pending if present. Reports
    /// whether anything changed.
    pub async fn add_pending(&self, raw: &str) -> bool {
        let Some(addr) = normalize_addr(raw, raw) else {
            return false;
        };
        let mut inner = self.inner.write().await;
        if inner.is_local(&addr) {
            return false;
        }
        if let Some(member) = inner.members.get_mut(&addr) {
            if member.status != Status::Pending {
                member.status = Status::Pending;
                member.last_seen = Instant::now();
                return true;
            }
            return false;
        }
        inner
            .members
            .insert(addr.clone(), Member::new(addr, Status::Pending));
        true
    }

    /// Transition a member into the active set, updating metadata.
    ///
    /// Inserts if absent. Updates the name when non-empty, touches
    /// `last_seen`, and caches the endpoint when the canonical address
    /// parses as one. Reports whether the status changed.
    pub async fn mark_active(&self, raw: &str, name: &str) -> bool {
        let Some(addr) = normalize_addr(raw, raw) else {
            return false;
        };
        let mut inner = self.inner.write().await;
        if inner.is_local(&addr) {
            return false;
        }
        let member = inner
            .members
            .entry(addr.clone())
            .or_insert_with(|| Member::new(addr.clone(), Status::Pending));
        if let Ok(ap) = addr.parse::<SocketAddr>() {
            member.endpoint = Some(ap);
        }
        let changed = member.status != Status::Active;
        member.status = Status::Active;
        if !name.is_empty() {
            member.name = name.to_string();
        }
        member.last_seen = Instant::now();
        changed
    }

    /// Demote a member to pending after a delivery failure, forgetting
    /// its cached endpoint. No-op when the member is unknown.
    pub async fn mark_failed(&self, raw: &str) -> bool {
        let Some(addr) = normalize_addr(raw, raw) else {
            return false;
        };
        let mut inner = self.inner.write().await;
        if inner.is_local(&addr) {
            return false;
        }
        match inner.members.get_mut(&addr) {
            None => false,
            Some(member) => {
                member.status = Status::Pending;
                member.last_seen = Instant::now();
                member.endpoint = None;
                true
            }
        }
    }

    /// Erase a member from the table. No-op when unknown.
    pub async fn remove(&self, raw: &str) -> bool {
        let Some(addr) = normalize_addr(raw, raw) else {
            return false;
        };
        let mut inner = self.inner.write().await;
        if inner.is_local(&addr) {
            return false;
        }
        inner.members.remove(&addr).is_some()
    }

    /// Whether the member is known to the session.
    pub async fn has(&self, raw: &str) -> bool {
        let Some(addr) = normalize_addr(raw, raw) else {
            return false;
        };
        let inner = self.inner.read().await;
        if inner.is_local(&addr) {
            return false;
        }
        inner.members.contains_key(&addr)
    }

    /// Cache the last reachable endpoint for a member, inserting a
    /// pending record if the member is unknown.
    pub async fn set_endpoint(&self, raw: &str, endpoint: SocketAddr) {
        let addr = raw.trim();
        if addr.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        let member = inner
            .members
            .entry(addr.to_string())
            .or_insert_with(|| Member::new(addr.to_string(), Status::Pending));
        member.endpoint = Some(endpoint);
    }

    /// The cached endpoint for a member, if any.
    pub async fn endpoint_of(&self, raw: &str) -> Option<SocketAddr> {
        let Some(addr) = normalize_addr(raw, raw) else {
            return None;
        };
        self.inner
            .read()
            .await
            .members
            .get(&addr)
            .and_then(Member::endpoint)
    }

    /// Sorted active peer addresses, never including the local node or
    /// any of the exclusions.
    pub async fn active_addrs(&self, excludes: &[&str]) -> Vec<String> {
        let mut exclude_set: HashSet<String> = excludes
            .iter()
            .copied()
            .filter_map(|ex| normalize_addr(ex, ex))
            .collect();
        let inner = self.inner.read().await;
        if !inner.local_addr.is_empty() {
            exclude_set.insert(inner.local_addr.clone());
        }
        let mut out: Vec<String> = inner
            .members
            .iter()
            .filter(|(addr, member)| {
                member.status == Status::Active && !exclude_set.contains(addr.as_str())
            })
            .map(|(addr, _)| addr.clone())
            .collect();
        out.sort();
        out
    }

    /// Sorted addresses currently in the pending state.
    pub async fn pending_addrs(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut out: Vec<String> = inner
            .members
            .values()
            .filter(|m| m.status == Status::Pending)
            .map(|m| m.addr.clone())
            .collect();
        out.sort();
        out
    }

    /// Active members with cached endpoints, suitable for forwarding.
    /// The local node and the excluded address are skipped.
    pub async fn active_endpoints(&self, exclude: Option<&str>) -> Vec<(String, SocketAddr)> {
        let exclude = exclude.map(str::trim).unwrap_or_default();
        let inner = self.inner.read().await;
        inner
            .members
            .iter()
            .filter(|(addr, member)| {
                member.status == Status::Active
                    && addr.as_str() != exclude
                    && addr.as_str() != inner.local_addr
            })
            .filter_map(|(addr, member)| member.endpoint().map(|ep| (addr.clone(), ep)))
            .collect()
    }

    /// Ordered copies of the active and pending members for display.
    pub async fn snapshot(&self) -> (Vec<Member>, Vec<Member>) {
        let inner = self.inner.read().await;
        let mut active = Vec::new();
        let mut pending = Vec::new();
        for member in inner.members.values() {
            match member.status {
                Status::Active => active.push(member.clone()),
                Status::Pending => pending.push(member.clone()),
            }
        }
        active.sort_by(|a, b| a.addr.cmp(&b.addr));
        pending.sort_by(|a, b| a.addr.cmp(&b.addr));
        (active, pending)
    }

    /// Encode the join payload describing this peer and its actives.
    pub async fn build_join_payload(&self) -> Result<String, serde_json::Error> {
        let inner = self.inner.read().await;
        let payload = JoinPayload {
            member: MemberInfo {
                addr: inner.local_addr.clone(),
                name: inner.local_name.clone(),
            },
            peers: inner.active_infos(""),
        };
        serde_json::to_string(&payload)
    }

    /// Encode a peers digest excluding the given address.
    pub async fn build_peers_payload(&self, exclude: &str) -> Result<String, serde_json::Error> {
        let inner = self.inner.read().await;
        let payload = PeersPayload {
            peers: inner.active_infos(exclude),
        };
        serde_json::to_string(&payload)
    }

    /// Integrate a join payload and prepare the peers response.
    ///
    /// The advertised address is normalised with the observed source as
    /// fallback (a peer bound to all interfaces advertises
    /// `0.0.0.0:<port>`). Returns the encoded response and the addresses
    /// of newly hinted peers to contact.
    pub async fn process_join(
        &self,
        data: &[u8],
        remote_addr: &str,
        remote_name: &str,
    ) -> Result<JoinOutcome, serde_json::Error> {
        let payload: JoinPayload = serde_json::from_slice(data)?;
        let addr = normalize_addr(&payload.member.addr, remote_addr)
            .unwrap_or_else(|| remote_addr.trim().to_string());
        let name = if payload.member.name.is_empty() {
            remote_name
        } else {
            payload.member.name.as_str()
        };
        let mut activated = false;
        if !addr.is_empty() && !self.is_local(&addr).await {
            activated = self.mark_active(&addr, name).await;
        }

        let hinted = self.collect_unknown(&payload.peers, &addr).await;
        let response = self.build_peers_payload(&addr).await?;
        Ok(JoinOutcome {
            response,
            hinted,
            activated,
        })
    }

    /// Integrate a peers digest and return new contacts to pursue.
    pub async fn process_peers(
        &self,
        data: &[u8],
        remote_addr: &str,
    ) -> Result<Vec<String>, serde_json::Error> {
        let payload: PeersPayload = serde_json::from_slice(data)?;
        Ok(self.collect_unknown(&payload.peers, remote_addr).await)
    }

    /// Record any peers we have not seen and return addresses to contact.
    async fn collect_unknown(&self, infos: &[MemberInfo], remote: &str) -> Vec<String> {
        let remote_canon = normalize_addr(remote, remote);
        let mut out = Vec::new();
        for info in infos {
            let Some(addr) = normalize_addr(&info.addr, remote) else {
                continue;
            };
            if remote_canon.as_deref() == Some(addr.as_str()) || self.is_local(&addr).await {
                continue;
            }
            if self.mark_active(&addr, &info.name).await {
                out.push(addr);
                continue;
            }
            if !self.has(&addr).await && self.add_pending(&addr).await {
                out.push(addr);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Membership {
        Membership::new("127.0.0.1:4000", "alice")
    }

    #[tokio::test]
    async fn test_local_node_is_active_but_never_listed() {
        let members = table();
        assert!(members.is_local("127.0.0.1:4000").await);
        assert!(members.active_addrs(&[]).await.is_empty());
        assert!(members.active_endpoints(None).await.is_empty());
        let payload = members.build_join_payload().await.unwrap();
        assert!(!payload.contains("peers"));
    }

    #[tokio::test]
    async fn test_local_detection_with_loopback_variants() {
        let members = table();
        // same port, both loopback
        assert!(members.is_local("127.0.0.2:4000").await);
        // different port is never local
        assert!(!members.is_local("127.0.0.1:4001").await);
    }

    #[tokio::test]
    async fn test_local_operations_are_refused() {
        let members = table();
        assert!(!members.add_pending("127.0.0.1:4000").await);
        assert!(!members.mark_active("127.0.0.1:4000", "imposter").await);
        assert!(!members.remove("127.0.0.1:4000").await);
        assert!(!members.has("127.0.0.1:4000").await);
    }

    #[tokio::test]
    async fn test_add_pending_then_mark_active() {
        let members = table();
        assert!(members.add_pending("10.0.0.2:5000").await);
        assert!(!members.add_pending("10.0.0.2:5000").await);
        assert!(members.mark_active("10.0.0.2:5000", "bob").await);
        assert_eq!(members.active_addrs(&[]).await, vec!["10.0.0.2:5000"]);
        assert!(members.pending_addrs().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_active_is_idempotent() {
        let members = table();
        assert!(members.mark_active("10.0.0.2:5000", "bob").await);
        assert!(!members.mark_active("10.0.0.2:5000", "bob").await);
    }

    #[tokio::test]
    async fn test_demotion_reports_changed() {
        let members = table();
        members.mark_active("10.0.0.2:5000", "bob").await;
        assert!(members.add_pending("10.0.0.2:5000").await);
        assert_eq!(members.pending_addrs().await, vec!["10.0.0.2:5000"]);
    }

    #[tokio::test]
    async fn test_mark_failed_clears_endpoint() {
        let members = table();
        members.mark_active("10.0.0.2:5000", "bob").await;
        assert!(members.endpoint_of("10.0.0.2:5000").await.is_some());
        assert!(members.mark_failed("10.0.0.2:5000").await);
        assert!(members.endpoint_of("10.0.0.2:5000").await.is_none());
        assert!(!members.mark_failed("10.9.9.9:1").await);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let members = table();
        assert!(!members.remove("10.0.0.2:5000").await);
        members.mark_active("10.0.0.2:5000", "").await;
        assert!(members.remove("10.0.0.2:5000").await);
        assert!(!members.has("10.0.0.2:5000").await);
    }

    #[tokio::test]
    async fn test_process_join_substitutes_unspecified_addr() {
        let members = table();
        let payload = br#"{"member":{"addr":"0.0.0.0:5000","name":"bob"}}"#;
        let outcome = members
            .process_join(payload, "192.168.1.9:5000", "")
            .await
            .unwrap();
        assert!(outcome.hinted.is_empty());
        assert!(outcome.activated);
        assert_eq!(members.active_addrs(&[]).await, vec!["192.168.1.9:5000"]);
    }

    #[tokio::test]
    async fn test_process_join_response_excludes_source_and_local() {
        let members = table();
        members.mark_active("10.0.0.3:5000", "carol").await;
        let payload = br#"{"member":{"addr":"10.0.0.2:5000","name":"bob"}}"#;
        let outcome = members
            .process_join(payload, "10.0.0.2:5000", "bob")
            .await
            .unwrap();
        assert!(outcome.response.contains("10.0.0.3:5000"));
        assert!(!outcome.response.contains("10.0.0.2:5000"));
        assert!(!outcome.response.contains("127.0.0.1:4000"));
    }

    #[tokio::test]
    async fn test_collect_unknown_skips_remote_and_local() {
        let members = table();
        let payload = br#"{"peers":[{"addr":"10.0.0.2:5000"},{"addr":"127.0.0.1:4000"},{"addr":"10.0.0.4:5000","name":"dave"}]}"#;
        let additional = members
            .process_peers(payload, "10.0.0.2:5000")
            .await
            .unwrap();
        assert_eq!(additional, vec!["10.0.0.4:5000"]);
        assert!(!members.has("127.0.0.1:4000").await);
    }

    #[tokio::test]
    async fn test_known_peers_are_not_hinted_again() {
        let members = table();
        members.mark_active("10.0.0.4:5000", "dave").await;
        let payload = br#"{"peers":[{"addr":"10.0.0.4:5000"}]}"#;
        let additional = members
            .process_peers(payload, "10.0.0.2:5000")
            .await
            .unwrap();
        assert!(additional.is_empty());
    }

    #[tokio::test]
    async fn test_reset_rebuilds_with_local_only() {
        let members = table();
        members.mark_active("10.0.0.2:5000", "bob").await;
        members.reset("127.0.0.1:4000", "zed").await;
        assert!(members.active_addrs(&[]).await.is_empty());
        assert_eq!(members.local_info().await.name, "zed");
    }

    #[tokio::test]
    async fn test_snapshot_orders_by_addr() {
        let members = table();
        members.mark_active("10.0.0.9:1", "").await;
        members.mark_active("10.0.0.2:1", "").await;
        members.add_pending("10.0.0.5:1").await;
        let (active, pending) = members.snapshot().await;
        let actives: Vec<&str> = active.iter().map(|m| m.addr.as_str()).collect();
        // snapshot includes the local entry
        assert_eq!(actives, vec!["10.0.0.2:1", "10.0.0.9:1", "127.0.0.1:4000"]);
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let members = table();
        assert!(members.process_peers(b"not json", "10.0.0.2:1").await.is_err());
    }
}
