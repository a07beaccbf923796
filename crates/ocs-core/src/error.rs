//! Error types for on-chain secret operations

use crate::types::{NodeIndex, RunId};
use thiserror::Error;

/// Result type alias for on-chain secret operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding keys or running re-encryption.
///
/// No variant carries secret material; messages only name indices,
/// lengths and run identifiers.
#[derive(Debug, Error)]
pub enum Error {
    /// Symmetric key does not fit into a single curve point
    #[error("Key too large: {len} bytes, a point holds at most {capacity}")]
    KeyTooLarge { len: usize, capacity: usize },

    /// Reconstructed point is not a valid embedding
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// A node's secret share does not match the commitment polynomial
    #[error("Local share of node {0} is inconsistent with the commitments")]
    LocalShareInconsistent(NodeIndex),

    /// Not enough partial shares to interpolate
    #[error("Insufficient shares: required {required}, got {actual}")]
    InsufficientShares { required: usize, actual: usize },

    /// Two partial shares carry the same index
    #[error("Duplicate share index: {0}")]
    DuplicateShareIndex(NodeIndex),

    /// Malformed or off-curve point encoding
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    /// Invalid configuration or topology
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Message addressed to a node the transport does not know
    #[error("Unknown node: {0}")]
    UnknownNode(NodeIndex),

    /// Every participant refused the request
    #[error("Re-encryption refused for run {0}")]
    Refused(RunId),

    /// The run did not finish before the caller's deadline
    #[error("Re-encryption run {0} timed out")]
    TimedOut(RunId),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
