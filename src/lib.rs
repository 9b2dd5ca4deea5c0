//! # Gabble - peer-to-peer terminal chat
//!
//! Gabble is a serverless chat for the terminal. Every participant binds a
//! UDP port, optionally knows a few bootstrap peers, and gossips each
//! message it originates or receives to everyone else it knows. Newly
//! contacted nodes answer with a membership digest, so the mesh converges
//! through transitive discovery without any coordinator.
//!
//! ## Overview
//!
//! - **Envelopes** are single-datagram JSON messages carrying an id, a
//!   sender name, a kind, and either a plaintext body or an AES-GCM
//!   ciphertext + nonce (base64).
//! - **Loop suppression** is by envelope id: each node remembers every id
//!   it has originated or seen and silently drops duplicates.
//! - **Encryption** is a shared secret: the 256-bit key is SHA-256 of the
//!   secret string. Mixing encrypted and plaintext peers is rejected with
//!   an `error` envelope in both directions.
//! - **Profiles** are named configurations persisted as JSON; a running
//!   session can hot-switch between them with `/switch` (same listener
//!   only).
//!
//! ## Modules
//!
//! - [`chat`]: the session core (transport, membership, gossip, TUI)
//! - [`config`]: named configuration profiles and their file store

pub mod chat;
pub mod config;
