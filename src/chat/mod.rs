//! # Gabble chat core
//!
//! The session owns one bound UDP listener and a membership table, and
//! gossips every envelope it originates or receives to all active peers.
//! Loop suppression is by envelope id; authentication is a shared-secret
//! AES-GCM seal over the message body.

mod cipher;
mod commands;
mod error;
mod membership;
mod message;
mod netutil;
pub mod network;
mod session;
mod transport;
pub mod tui;

pub use cipher::{AesGcmCipher, PacketCipher};
pub use error::ChatError;
pub use membership::{JoinOutcome, Member, MemberInfo, Membership, Status};
pub use message::{new_message_id, Message, MsgKind};
pub use netutil::{canonical_addr, normalize_addr};
pub use network::{Network, PacketSocket, UdpNetwork};
pub use session::{EventStream, Session, SessionOptions};
pub use transport::{PacketHandler, Transport};
