//! Error types for the mental poker protocol

use thiserror::Error;

use crate::protocol::ParticipantId;

/// Main error type for the mental poker protocol
#[derive(Debug, Clone, Error)]
pub enum PokerError {
    #[error("Network error: {source}")]
    Network {
        source: NetworkError,
        context: String,
    },

    /// Malformed length prefix or frame body. Framing cannot be trusted after this.
    #[error("Framing error: {message}")]
    Framing { message: String },

    /// A message claiming to come from the Playing Area (or the Caller acting as arbiter)
    /// failed verification. The trust root is broken.
    #[error("Signature forged by {sender}, the game is compromised")]
    SignatureForgedByServer { sender: String },

    #[error("Signature forged by player {id}")]
    SignatureForgedByPeer { id: ParticipantId },

    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("All players were disqualified or disconnected, the game has no winner")]
    QuorumLost,

    #[error("The caller's deck layer failed verification, the root deck cannot be trusted")]
    DeckCompromised,

    #[error("Registration rejected: {reason}")]
    RegistrationRejected { reason: String },

    #[error("Cryptographic error: {source}")]
    Cryptographic {
        source: CryptoError,
        context: String,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: String,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Hex decoding error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

/// Network-specific error types
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

/// Cryptographic error types
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("Invalid key: {message}")]
    InvalidKey { message: String },

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,
}

impl PokerError {
    /// Shorthand for a protocol violation
    pub fn violation(message: impl Into<String>) -> Self {
        PokerError::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the whole process rather than a single peer relationship
    pub fn is_fatal(&self) -> bool {
        match self {
            PokerError::SignatureForgedByServer { .. }
            | PokerError::QuorumLost
            | PokerError::DeckCompromised
            | PokerError::Configuration { .. } => true,
            PokerError::SignatureForgedByPeer { .. }
            | PokerError::Framing { .. }
            | PokerError::ProtocolViolation { .. }
            | PokerError::Network { .. }
            | PokerError::RegistrationRejected { .. }
            | PokerError::Cryptographic { .. }
            | PokerError::Serialization { .. }
            | PokerError::HexDecode(_) => false,
        }
    }
}

impl From<NetworkError> for PokerError {
    fn from(err: NetworkError) -> Self {
        PokerError::Network {
            source: err,
            context: String::new(),
        }
    }
}

impl From<CryptoError> for PokerError {
    fn from(err: CryptoError) -> Self {
        PokerError::Cryptographic {
            source: err,
            context: String::new(),
        }
    }
}

impl From<serde_json::Error> for PokerError {
    fn from(err: serde_json::Error) -> Self {
        PokerError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for PokerError {
    fn from(err: std::io::Error) -> Self {
        PokerError::Network {
            source: NetworkError::ConnectionFailed {
                message: err.to_string(),
            },
            context: String::new(),
        }
    }
}

/// Utility functions for hashing
pub mod utils {
    use sha2::{Digest, Sha256};

    /// Compute SHA256 hash of input data
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Compute SHA256 hash and return as hex string
    pub fn sha256_hex(data: &[u8]) -> String {
        hex::encode(sha256(data))
    }
}

/// Type alias for the main result type used throughout the library
pub type PokerResult<T> = Result<T, PokerError>;
