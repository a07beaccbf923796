//! Distributed re-encryption protocol
//!
//! The root disseminates a [`ReencryptionRequest`](crate::ReencryptionRequest)
//! down a fixed tree. Every node, root included:
//!
//! 1. ignores the request if it already handled the run,
//! 2. asks its verification policy (no payload means refusal),
//! 3. checks its own share against the commitment polynomial,
//! 4. contributes `share * (U + Xc)` if both checks pass,
//! 5. relays the request to its children, waits a bounded time for their
//!    replies and forwards the merged subtree outcome to its parent.
//!
//! At the root the run completes with every collected share, or is refused
//! when no node contributed. Counting shares against the threshold is left
//! to the caller.

mod cluster;
mod messages;
mod node;
mod state;

pub use cluster::LocalCluster;
pub use messages::Message;
pub use node::{ReencryptHandle, ReencryptNode};
pub use state::{Contribution, Phase, ProtocolRunState, RunOutcome};
