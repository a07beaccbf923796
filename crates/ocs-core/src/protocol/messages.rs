//! Re-encryption protocol messages

use crate::types::{NodeIndex, PartialShare, ReencryptionRequest, RunId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Messages exchanged along the communication tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Request travelling from the root towards the leaves
    Reencrypt {
        run_id: RunId,
        request: ReencryptionRequest,
    },
    /// Aggregated subtree outcome travelling towards the root
    Reply {
        run_id: RunId,
        /// Child that sends the reply
        from: NodeIndex,
        /// Partial shares contributed in the sender's subtree
        shares: Vec<PartialShare>,
        /// Subtree nodes that contributed nothing
        refused: Vec<NodeIndex>,
    },
}

impl Message {
    /// Run this message belongs to
    pub fn run_id(&self) -> RunId {
        match self {
            Message::Reencrypt { run_id, .. } => *run_id,
            Message::Reply { run_id, .. } => *run_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
