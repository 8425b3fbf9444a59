//! Error handling for the node
//!
//! Every fallible operation in the crate returns [`BlockchainError`]. Consensus
//! rejections (bad proof-of-work, ineligible stakeholder, duplicate block) are
//! ordinary variants so callers can log them and carry on.

use std::fmt;

/// Result type alias for blockchain operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Malformed frame or payload on the wire
    Protocol(String),
    /// Transaction validation errors
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Not enough units owned to cover a transfer
    InsufficientFunds { required: u64, available: u64 },
    /// Block validation errors
    InvalidBlock(String),
    /// Header hash does not satisfy the target or does not match its fields
    InvalidProofOfWork(String),
    /// Claimed stakeholder does not own the unit picked by the lottery
    IneligibleStakeholder { index: u64 },
    /// A block with this hash is already stored
    DuplicateBlock(String),
    /// Lookup exhausted the chain
    NotFound(String),
    /// Nonce search failed
    Mining(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::InvalidProofOfWork(hash) => {
                write!(f, "Invalid proof-of-work for block {hash}")
            }
            BlockchainError::IneligibleStakeholder { index } => {
                write!(f, "Stakeholder does not own lottery unit {index}")
            }
            BlockchainError::DuplicateBlock(hash) => write!(f, "Block already exists: {hash}"),
            BlockchainError::NotFound(what) => write!(f, "Not found: {what}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl BlockchainError {
    /// True for consensus rejections that leave the node healthy.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BlockchainError::InvalidProofOfWork(_)
                | BlockchainError::IneligibleStakeholder { .. }
                | BlockchainError::DuplicateBlock(_)
                | BlockchainError::InvalidBlock(_)
        )
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Protocol(err.to_string())
    }
}
