//! # OCS Core
//!
//! On-chain secrets: threshold re-encryption of document keys.
//!
//! A writer seals a document under a short symmetric key and encodes that key
//! to the collective public key `X` of a group of nodes. A reader later asks
//! the group to re-encrypt the key to its own public key `Xc`. Each node that
//! agrees contributes a partial share; any `threshold` of them let the reader
//! recover the key without any node ever learning it.
//!
//! This crate provides:
//! - Point embedding and ElGamal-style key encoding/decoding
//! - Feldman commitments, dealing and Lagrange recovery of shares
//! - The tree-distributed re-encryption protocol
//! - Document sealing under the recovered key
//!
//! ## Example
//!
//! ```rust,ignore
//! use ocs_core::{deal, encode_key, decode_key, recover_commit, LocalCluster};
//!
//! let (poly, shares) = deal(5, 3)?;
//! let encoded = encode_key(&poly.public_key(), &document_key)?;
//!
//! let cluster = LocalCluster::spawn(shares, topology, policy, config)?;
//! let request = ReencryptionRequest::new(&encoded, reader.public, poly.clone(), Some(block));
//! let shares = cluster.root().start_reencryption(request)?.wait_for_shares(limit).await?;
//!
//! let xhat_enc = recover_commit(&shares, poly.threshold())?;
//! let key = decode_key(&poly.public_key(), &encoded.c, &xhat_enc, &reader.secret)?;
//! ```

pub mod codec;
pub mod document;
pub mod embed;
pub mod error;
pub mod net;
pub mod policy;
pub mod protocol;
pub mod share;
pub mod types;

pub use codec::{decode_key, encode_key};
pub use embed::EMBED_CAPACITY;
pub use error::{Error, Result};
pub use net::{MemoryNetwork, Topology, Transport};
pub use policy::{ExpectedPayload, PayloadPresent, VerificationPolicy};
pub use protocol::{LocalCluster, ReencryptHandle, ReencryptNode, RunOutcome};
pub use share::{deal, recover_commit};
pub use types::{
    CommitmentPolynomial, DistKeyShare, EncodedKey, KeyPair, NodeConfig, NodeIndex,
    PartialShare, ReencryptionRequest, RunId,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default branching factor of the communication tree
pub const DEFAULT_BRANCHING: usize = 2;
