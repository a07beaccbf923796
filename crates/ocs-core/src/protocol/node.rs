//! Protocol node: verifies requests, contributes its share and aggregates
//! its subtree

use super::state::{Contribution, ProtocolRunState, RunOutcome};
use super::Message;
use crate::net::{Inbox, Topology, Transport};
use crate::policy::{authorize, VerificationPolicy};
use crate::types::{DistKeyShare, NodeConfig, NodeIndex, PartialShare, ReencryptionRequest, RunId};
use crate::{Error, Result};
use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Subtree outcome received from a child
#[derive(Debug)]
struct ChildReply {
    from: NodeIndex,
    shares: Vec<PartialShare>,
    refused: Vec<NodeIndex>,
}

/// Routing entry for a run on this node
enum RunSlot {
    /// The run task is collecting child replies
    Active(mpsc::UnboundedSender<ChildReply>),
    /// The run forwarded its outcome at the given instant; later traffic
    /// is ignored until the slot is pruned
    Finished(Instant),
}

/// One key-holding node of the re-encryption tree
pub struct ReencryptNode<T: Transport> {
    index: NodeIndex,
    share: DistKeyShare,
    topology: Arc<Topology>,
    transport: Arc<T>,
    policy: Arc<dyn VerificationPolicy>,
    config: NodeConfig,
    runs: DashMap<RunId, RunSlot>,
}

impl<T: Transport + 'static> ReencryptNode<T> {
    /// Create a node holding `share`; the share index is the node's tree position
    pub fn new(
        share: DistKeyShare,
        topology: Arc<Topology>,
        transport: Arc<T>,
        policy: Arc<dyn VerificationPolicy>,
        config: NodeConfig,
    ) -> Result<Self> {
        if !topology.contains(share.index) {
            return Err(Error::InvalidConfig(format!(
                "share index {} is outside the topology of {} nodes",
                share.index,
                topology.len()
            )));
        }

        Ok(Self {
            index: share.index,
            share,
            topology,
            transport,
            policy,
            config,
            runs: DashMap::new(),
        })
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn is_root(&self) -> bool {
        self.topology.root() == self.index
    }

    /// Serve messages from `inbox` until it closes
    pub fn spawn(self: Arc<Self>, mut inbox: Inbox) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                match message {
                    Ok(message) => self.handle(message),
                    Err(e) => warn!(node = self.index, error = %e, "Dropping malformed message"),
                }
            }
            debug!(node = self.index, "Inbox closed");
        })
    }

    /// Dispatch one message delivered by the transport
    pub fn handle(self: &Arc<Self>, message: Message) {
        match message {
            Message::Reencrypt { run_id, request } => {
                self.accept_request(run_id, request, None);
            }
            Message::Reply {
                run_id,
                from,
                shares,
                refused,
            } => self.accept_reply(
                run_id,
                ChildReply {
                    from,
                    shares,
                    refused,
                },
            ),
        }
    }

    /// Start a new run with this node as root.
    ///
    /// The request travels down the tree; the returned handle resolves once
    /// every level has answered or given up on its silent children.
    pub fn start_reencryption(
        self: &Arc<Self>,
        request: ReencryptionRequest,
    ) -> Result<ReencryptHandle> {
        if !self.is_root() {
            return Err(Error::InvalidConfig(format!(
                "node {} is not the root of the tree",
                self.index
            )));
        }

        let run_id = RunId::new();
        let (done, rx) = oneshot::channel();

        info!(
            run_id = %run_id,
            threshold = request.threshold,
            nodes = self.topology.len(),
            "Starting re-encryption"
        );
        self.accept_request(run_id, request, Some(done));

        Ok(ReencryptHandle {
            run_id,
            done: rx,
            outcome: None,
        })
    }

    /// Register a run and spawn its task. Returns `false` for a run this
    /// node has already seen.
    pub(crate) fn accept_request(
        self: &Arc<Self>,
        run_id: RunId,
        request: ReencryptionRequest,
        completion: Option<oneshot::Sender<RunOutcome>>,
    ) -> bool {
        self.prune_finished();

        let (tx, rx) = mpsc::unbounded_channel();
        match self.runs.entry(run_id) {
            Entry::Occupied(_) => {
                debug!(node = self.index, run_id = %run_id, "Duplicate request ignored");
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(RunSlot::Active(tx));
            }
        }

        let node = Arc::clone(self);
        tokio::spawn(async move { node.drive(run_id, request, rx, completion).await });
        true
    }

    fn accept_reply(&self, run_id: RunId, reply: ChildReply) {
        match self.runs.get(&run_id).as_deref() {
            Some(RunSlot::Active(tx)) => {
                if tx.send(reply).is_err() {
                    debug!(node = self.index, run_id = %run_id, "Run task already gone");
                }
            }
            Some(RunSlot::Finished(_)) => {
                debug!(node = self.index, run_id = %run_id, from = reply.from, "Late reply ignored");
            }
            None => {
                debug!(node = self.index, run_id = %run_id, "Reply for unknown run ignored");
            }
        }
    }

    #[instrument(skip_all, fields(node = self.index, run_id = %run_id))]
    async fn drive(
        self: Arc<Self>,
        run_id: RunId,
        request: ReencryptionRequest,
        mut replies: mpsc::UnboundedReceiver<ChildReply>,
        completion: Option<oneshot::Sender<RunOutcome>>,
    ) {
        let mut state = ProtocolRunState::new(run_id, request);
        let contribution = self.contribute(state.request());
        state.record_local(self.index, contribution);

        let mut pending = self.relay_to_children(run_id, state.request()).await;
        if !pending.is_empty() {
            let deadline = Instant::now() + self.subtree_wait();
            while !pending.is_empty() {
                match timeout_at(deadline, replies.recv()).await {
                    Ok(Some(reply)) => {
                        if pending.remove(&reply.from) {
                            state.merge(reply.shares, reply.refused);
                        } else {
                            debug!(from = reply.from, "Reply from unexpected node ignored");
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(missing = ?pending, "Children did not answer in time");
                        break;
                    }
                }
            }
        }

        state.begin_forwarding();
        self.runs.insert(run_id, RunSlot::Finished(Instant::now()));

        match self.topology.parent(self.index) {
            Some(parent) => {
                debug!(parent, collected = state.collected_len(), "Forwarding subtree outcome");
                let reply = state.into_reply(self.index);
                if let Err(e) = self.transport.send(self.index, parent, &reply).await {
                    warn!(parent, error = %e, "Failed to forward reply");
                }
            }
            None => {
                let outcome = state.finish();
                match &outcome {
                    RunOutcome::Completed(shares) => {
                        info!(shares = shares.len(), "Re-encryption completed")
                    }
                    _ => info!("Re-encryption refused by every node"),
                }
                match completion {
                    Some(done) => {
                        if done.send(outcome).is_err() {
                            debug!("Caller stopped waiting");
                        }
                    }
                    None => debug!("Run reached the root without a waiting caller"),
                }
            }
        }
    }

    /// Policy check, share check, then the partial re-encryption
    fn contribute(&self, request: &ReencryptionRequest) -> Contribution {
        if !authorize(self.policy.as_ref(), request) {
            info!(node = self.index, "Verification refused the request");
            return Contribution::Refused;
        }

        if !request.poly.check(&self.share) {
            let error = Error::LocalShareInconsistent(self.index);
            warn!(node = self.index, %error, "Not contributing");
            return Contribution::Inconsistent;
        }

        Contribution::Share(self.share.reencrypt(&request.u, &request.xc))
    }

    /// Send the request to every child; returns the children reached
    async fn relay_to_children(
        &self,
        run_id: RunId,
        request: &ReencryptionRequest,
    ) -> HashSet<NodeIndex> {
        let children = self.topology.children(self.index);
        if children.is_empty() {
            return HashSet::new();
        }

        let message = Message::Reencrypt {
            run_id,
            request: request.clone(),
        };
        let message = &message;
        let sends = children.iter().map(|&child| async move {
            (child, self.transport.send(self.index, child, message).await)
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|(child, result)| match result {
                Ok(()) => Some(child),
                Err(e) => {
                    warn!(child, error = %e, "Failed to relay request");
                    None
                }
            })
            .collect()
    }

    /// Forget finished runs older than the retention window
    fn prune_finished(&self) {
        let retention = self.config.run_retention;
        self.runs.retain(|_, slot| match slot {
            RunSlot::Finished(at) => at.elapsed() < retention,
            RunSlot::Active(_) => true,
        });
    }

    /// Lower levels finish within their own budget before this one expires
    fn subtree_wait(&self) -> Duration {
        self.config.child_wait * self.topology.height(self.index) as u32
    }
}

/// Completion signal of a run started at the root
pub struct ReencryptHandle {
    run_id: RunId,
    done: oneshot::Receiver<RunOutcome>,
    outcome: Option<RunOutcome>,
}

impl ReencryptHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Outcome if the run has finished, without waiting
    pub fn try_outcome(&mut self) -> Option<RunOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.done.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(RunOutcome::TimedOut),
            };
        }
        self.outcome.clone()
    }

    /// Wait at most `limit` for the outcome
    pub async fn wait(mut self, limit: Duration) -> RunOutcome {
        if let Some(outcome) = self.try_outcome() {
            return outcome;
        }

        match timeout(limit, self.done).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!(run_id = %self.run_id, "Run ended without an outcome");
                RunOutcome::TimedOut
            }
            Err(_) => {
                info!(run_id = %self.run_id, "Re-encryption timed out");
                RunOutcome::TimedOut
            }
        }
    }

    /// Wait for the collected shares, turning refusal and timeout into errors
    pub async fn wait_for_shares(self, limit: Duration) -> Result<Vec<PartialShare>> {
        let run_id = self.run_id;
        self.wait(limit).await.into_shares(run_id)
    }
}
