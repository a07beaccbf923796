//! A whole re-encryption tree running in-process

use super::node::ReencryptNode;
use crate::net::{MemoryNetwork, Topology};
use crate::policy::VerificationPolicy;
use crate::types::{DistKeyShare, NodeConfig, NodeIndex};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Nodes of one tree connected through a [`MemoryNetwork`]
pub struct LocalCluster {
    network: Arc<MemoryNetwork>,
    topology: Arc<Topology>,
    nodes: Vec<Arc<ReencryptNode<MemoryNetwork>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Start one node per share, all evaluating the same policy
    pub fn spawn(
        shares: Vec<DistKeyShare>,
        topology: Topology,
        policy: Arc<dyn VerificationPolicy>,
        config: NodeConfig,
    ) -> Result<Self> {
        let policies = vec![policy; shares.len()];
        Self::spawn_with_policies(shares, topology, policies, config)
    }

    /// Start one node per share with `policies[i]` on node `i`
    pub fn spawn_with_policies(
        mut shares: Vec<DistKeyShare>,
        topology: Topology,
        policies: Vec<Arc<dyn VerificationPolicy>>,
        config: NodeConfig,
    ) -> Result<Self> {
        let n = topology.len();
        if shares.len() != n || policies.len() != n {
            return Err(Error::InvalidConfig(format!(
                "topology has {} nodes but got {} shares and {} policies",
                n,
                shares.len(),
                policies.len()
            )));
        }

        shares.sort_by_key(|share| share.index);
        if shares.iter().enumerate().any(|(position, share)| share.index != position) {
            return Err(Error::InvalidConfig(format!(
                "share indices must cover 0..{}",
                n
            )));
        }

        let network = Arc::new(MemoryNetwork::new());
        let topology = Arc::new(topology);
        let mut nodes = Vec::with_capacity(n);
        let mut tasks = Vec::with_capacity(n);

        for (share, policy) in shares.into_iter().zip(policies) {
            let inbox = network.connect(share.index);
            let node = Arc::new(ReencryptNode::new(
                share,
                Arc::clone(&topology),
                Arc::clone(&network),
                policy,
                config,
            )?);
            tasks.push(Arc::clone(&node).spawn(inbox));
            nodes.push(node);
        }

        info!(nodes = n, root = topology.root(), "Local cluster started");

        Ok(Self {
            network,
            topology,
            nodes,
            tasks,
        })
    }

    /// Node that starts runs
    pub fn root(&self) -> &Arc<ReencryptNode<MemoryNetwork>> {
        &self.nodes[self.topology.root()]
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Arc<ReencryptNode<MemoryNetwork>>> {
        self.nodes.get(index)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Make `index` unreachable
    pub fn pause(&self, index: NodeIndex) {
        self.network.pause(index);
    }

    pub fn resume(&self, index: NodeIndex) {
        self.network.resume(index);
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
