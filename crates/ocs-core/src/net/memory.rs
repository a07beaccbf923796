//! In-memory transport implementation

use super::{async_trait, Transport};
use crate::protocol::Message;
use crate::types::NodeIndex;
use crate::{Error, Result};
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tracing::debug;

/// In-process network connecting nodes through per-node channels.
///
/// Messages are serialized on send so that nodes never share state.
/// A paused node neither receives nor sends; its traffic is dropped.
pub struct MemoryNetwork {
    /// Inbound channel of every connected node
    inboxes: DashMap<NodeIndex, mpsc::UnboundedSender<Vec<u8>>>,
    /// Nodes currently paused
    paused: DashSet<NodeIndex>,
}

/// Receiving end of a node's channel
pub struct Inbox {
    index: NodeIndex,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Inbox {
    /// Node this inbox belongs to
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Wait for the next message; `None` once the network is gone
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        let bytes = self.rx.recv().await?;
        Some(Message::from_bytes(&bytes))
    }
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self {
            inboxes: DashMap::new(),
            paused: DashSet::new(),
        }
    }

    /// Attach node `index`, replacing any earlier inbox
    pub fn connect(&self, index: NodeIndex) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(index, tx);
        Inbox { index, rx }
    }

    /// Stop delivering to and from `index`
    pub fn pause(&self, index: NodeIndex) {
        debug!(node = index, "Pausing node");
        self.paused.insert(index);
    }

    /// Resume delivery for `index`
    pub fn resume(&self, index: NodeIndex) {
        debug!(node = index, "Resuming node");
        self.paused.remove(&index);
    }

    pub fn is_paused(&self, index: NodeIndex) -> bool {
        self.paused.contains(&index)
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn send(&self, from: NodeIndex, to: NodeIndex, message: &Message) -> Result<()> {
        let bytes = message.to_bytes()?;

        let tx = self
            .inboxes
            .get(&to)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownNode(to))?;

        if self.is_paused(from) || self.is_paused(to) {
            debug!(from, to, run_id = %message.run_id(), "Dropping message for paused node");
            return Ok(());
        }

        tx.send(bytes)
            .map_err(|_| Error::Transport(format!("inbox of node {} is closed", to)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    fn reply(from: NodeIndex) -> Message {
        Message::Reply {
            run_id: RunId::new(),
            from,
            shares: vec![],
            refused: vec![from],
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let network = MemoryNetwork::new();
        let mut inbox = network.connect(0);
        let _other = network.connect(1);

        let message = reply(1);
        network.send(1, 0, &message).await.unwrap();

        let received = inbox.recv().await.unwrap().unwrap();
        assert_eq!(received, message);
        assert_eq!(inbox.index(), 0);
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let network = MemoryNetwork::new();
        let result = network.send(0, 9, &reply(0)).await;
        assert!(matches!(result, Err(Error::UnknownNode(9))));
    }

    #[tokio::test]
    async fn test_paused_node_drops_traffic() {
        let network = MemoryNetwork::new();
        let mut inbox = network.connect(0);
        let _paused = network.connect(1);

        network.pause(1);
        network.send(1, 0, &reply(1)).await.unwrap();
        network.send(0, 1, &reply(0)).await.unwrap();

        network.resume(1);
        let message = reply(1);
        network.send(1, 0, &message).await.unwrap();

        // Only the message sent after resuming arrives
        assert_eq!(inbox.recv().await.unwrap().unwrap(), message);
        assert!(inbox.rx.try_recv().is_err());
    }
}
