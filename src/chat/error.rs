//! Chat error types.

use thiserror::Error;

/// Errors that can occur while running a chat session.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The user asked to leave the chat.
    #[error("quit")]
    Quit,

    /// The shared secret was rejected at cipher construction.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// Message encryption failed.
    #[error("encrypt message: {0}")]
    EncryptionFailed(String),

    /// Message decryption or authentication failed.
    #[error("decrypt message: {0}")]
    DecryptionFailed(String),

    /// The listener could not be bound.
    #[error("listen on {addr:?}: {source}")]
    Bind {
        /// The listen spec that failed to bind.
        addr: String,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// A peer address could not be resolved.
    #[error("resolve peer {addr:?}: {source}")]
    Resolve {
        /// The peer spec that failed to resolve.
        addr: String,
        /// The underlying resolution error.
        source: std::io::Error,
    },

    /// An envelope could not be encoded for the wire.
    #[error("encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// I/O error from the datagram socket or terminal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
