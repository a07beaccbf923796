//! Tree transport between protocol nodes

use crate::protocol::Message;
use crate::types::NodeIndex;
use crate::Result;

pub use ::async_trait::async_trait;

/// Point-to-point delivery along the communication tree.
///
/// Delivery may silently fail for paused or crashed nodes; callers never
/// wait on a send for an answer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` from node `from` to node `to`
    async fn send(&self, from: NodeIndex, to: NodeIndex, message: &Message) -> Result<()>;
}

/// In-memory transport for local clusters and testing
pub mod memory;
pub mod topology;

pub use memory::{Inbox, MemoryNetwork};
pub use topology::Topology;
