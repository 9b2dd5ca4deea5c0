//! The wire envelope.
//!
//! Every datagram carries exactly one JSON-encoded [`Message`]. For
//! transmitted envelopes either `body` is set (plaintext session) or
//! `cipher`/`nonce` are set (encrypted session), never both.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Envelope kind discriminator.
///
/// `System` and `Prompt` are strictly local: the session emits them to the
/// UI but never puts them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgKind {
    /// User chat text.
    Chat,
    /// Membership announcement carrying a join payload.
    Join,
    /// Departure notice.
    Leave,
    /// Rejection explanation sent back to a misbehaving peer.
    Error,
    /// Local status notice for the UI.
    System,
    /// Local prompt-label update for the UI.
    Prompt,
    /// Membership digest response to a join.
    Peers,
}

/// A single chat envelope; one envelope per datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// 96-bit random hex identifier, unique per originated message.
    #[serde(default)]
    pub id: String,
    /// Sender display name (advisory).
    #[serde(default)]
    pub from: String,
    /// Plaintext content; empty when the envelope is encrypted.
    #[serde(default)]
    pub body: String,
    /// Envelope kind.
    pub kind: MsgKind,
    /// Seconds since epoch at origination.
    #[serde(default)]
    pub timestamp: i64,
    /// Base64 ciphertext when encryption is enabled.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cipher: String,
    /// Base64 nonce when encryption is enabled.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
}

impl Message {
    /// Build a fresh envelope ready for transmission.
    pub fn new(kind: MsgKind, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            from: from.into(),
            body: body.into(),
            kind,
            timestamp: unix_now(),
            cipher: String::new(),
            nonce: String::new(),
        }
    }

    /// Build a local-only system notice.
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            from: String::new(),
            body: body.into(),
            kind: MsgKind::System,
            timestamp: 0,
            cipher: String::new(),
            nonce: String::new(),
        }
    }

    /// Build a local-only prompt update carrying the new display name.
    pub fn prompt(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            from: String::new(),
            body: name.into(),
            kind: MsgKind::Prompt,
            timestamp: 0,
            cipher: String::new(),
            nonce: String::new(),
        }
    }

    /// Whether the envelope carries an encrypted body.
    pub fn is_encrypted(&self) -> bool {
        !self.cipher.is_empty()
    }
}

/// Generate a fresh 12-byte random id as lowercase hex.
///
/// Falls back to a nanosecond timestamp if the system RNG is unavailable,
/// so id generation never blocks message flow.
pub fn new_message_id() -> String {
    let mut bytes = [0u8; 12];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        return unix_nanos().to_string();
    }
    hex::encode(bytes)
}

/// Current time as seconds since the Unix epoch.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
