//! Per-run state owned by the task driving one protocol run on one node

use super::Message;
use crate::types::{NodeIndex, PartialShare, ReencryptionRequest, RunId};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Progress of a run on a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request received, policy and share checks pending
    AwaitingLocalVerification,
    /// Local partial share computed
    Contributing,
    /// No local contribution (policy refusal or inconsistent share)
    Refusing,
    /// Subtree outcome handed to the parent, or to the caller at the root
    Forwarding,
}

/// What a node decided to contribute for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    Share(PartialShare),
    /// The verification policy rejected the request
    Refused,
    /// The node's share failed the commitment check
    Inconsistent,
}

/// Final result of a run as observed at the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// At least one share was collected; may hold fewer than `n`
    Completed(Vec<PartialShare>),
    /// No node contributed a share
    Refused,
    /// The caller's deadline passed first
    TimedOut,
}

impl RunOutcome {
    /// Collected shares of a completed run
    pub fn shares(&self) -> Option<&[PartialShare]> {
        match self {
            RunOutcome::Completed(shares) => Some(shares),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// Shares of a completed run; refusal and timeout become errors
    pub fn into_shares(self, run_id: RunId) -> Result<Vec<PartialShare>> {
        match self {
            RunOutcome::Completed(shares) => Ok(shares),
            RunOutcome::Refused => Err(Error::Refused(run_id)),
            RunOutcome::TimedOut => Err(Error::TimedOut(run_id)),
        }
    }
}

/// State of one run on one node
#[derive(Debug)]
pub struct ProtocolRunState {
    run_id: RunId,
    request: ReencryptionRequest,
    phase: Phase,
    local: Option<PartialShare>,
    contributed: bool,
    collected: BTreeMap<NodeIndex, PartialShare>,
    refused: BTreeSet<NodeIndex>,
}

impl ProtocolRunState {
    pub fn new(run_id: RunId, request: ReencryptionRequest) -> Self {
        Self {
            run_id,
            request,
            phase: Phase::AwaitingLocalVerification,
            local: None,
            contributed: false,
            collected: BTreeMap::new(),
            refused: BTreeSet::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn request(&self) -> &ReencryptionRequest {
        &self.request
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Local share, if this node contributed
    pub fn local_share(&self) -> Option<&PartialShare> {
        self.local.as_ref()
    }

    /// Whether this node contributed its own share
    pub fn contributed(&self) -> bool {
        self.contributed
    }

    pub fn collected_len(&self) -> usize {
        self.collected.len()
    }

    /// Record the local decision; only the first call has an effect
    pub fn record_local(&mut self, node: NodeIndex, contribution: Contribution) {
        if self.phase != Phase::AwaitingLocalVerification {
            return;
        }
        match contribution {
            Contribution::Share(share) => {
                self.local = Some(share);
                self.contributed = true;
                self.collected.insert(share.index, share);
                self.phase = Phase::Contributing;
            }
            Contribution::Refused | Contribution::Inconsistent => {
                self.refused.insert(node);
                self.phase = Phase::Refusing;
            }
        }
    }

    /// Merge a child's subtree outcome. Indices stay unique; a conflicting
    /// second value for an index is dropped.
    pub fn merge(&mut self, shares: Vec<PartialShare>, refused: Vec<NodeIndex>) {
        if self.phase == Phase::Forwarding {
            return;
        }
        for share in shares {
            match self.collected.get(&share.index) {
                Some(existing) if existing.value != share.value => {
                    warn!(
                        run_id = %self.run_id,
                        index = share.index,
                        "Conflicting partial share dropped"
                    );
                }
                Some(_) => {}
                None => {
                    self.collected.insert(share.index, share);
                }
            }
        }
        self.refused.extend(refused);
    }

    /// Stop accepting child replies
    pub fn begin_forwarding(&mut self) {
        self.phase = Phase::Forwarding;
    }

    /// Reply for the parent carrying the whole subtree outcome
    pub fn into_reply(self, from: NodeIndex) -> Message {
        Message::Reply {
            run_id: self.run_id,
            from,
            shares: self.collected.into_values().collect(),
            refused: self.refused.into_iter().collect(),
        }
    }

    /// Outcome at the root: refused when nobody contributed
    pub fn finish(self) -> RunOutcome {
        if self.collected.is_empty() {
            RunOutcome::Refused
        } else {
            RunOutcome::Completed(self.collected.into_values().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitmentPolynomial;
    use k256::{ProjectivePoint, Scalar};

    fn state() -> ProtocolRunState {
        let request = ReencryptionRequest {
            u: ProjectivePoint::GENERATOR,
            xc: ProjectivePoint::GENERATOR,
            threshold: 2,
            verification_data: None,
            poly: CommitmentPolynomial { commits: vec![] },
        };
        ProtocolRunState::new(RunId::new(), request)
    }

    fn share(index: NodeIndex, k: u64) -> PartialShare {
        PartialShare {
            index,
            value: ProjectivePoint::GENERATOR * Scalar::from(k),
        }
    }

    #[test]
    fn test_contributes_at_most_once() {
        let mut state = state();
        state.record_local(0, Contribution::Share(share(0, 1)));
        state.record_local(0, Contribution::Share(share(0, 2)));
        state.record_local(0, Contribution::Refused);

        assert_eq!(state.phase(), Phase::Contributing);
        assert!(state.contributed());
        assert_eq!(state.local_share(), Some(&share(0, 1)));
        assert_eq!(state.collected_len(), 1);
    }

    #[test]
    fn test_all_refused_finishes_refused() {
        let mut state = state();
        state.record_local(0, Contribution::Refused);
        state.merge(vec![], vec![1, 2]);
        assert_eq!(state.phase(), Phase::Refusing);
        assert!(!state.contributed());
        assert_eq!(state.finish(), RunOutcome::Refused);
    }

    #[test]
    fn test_merge_keeps_indices_unique() {
        let mut state = state();
        state.record_local(0, Contribution::Inconsistent);
        state.merge(vec![share(1, 1), share(2, 2)], vec![]);
        state.merge(vec![share(1, 1), share(2, 5)], vec![]);

        let outcome = state.finish();
        assert_eq!(outcome.shares().unwrap(), &[share(1, 1), share(2, 2)]);
    }

    #[test]
    fn test_outcome_into_shares() {
        let run_id = RunId::new();
        assert_eq!(
            RunOutcome::Completed(vec![share(0, 1)]).into_shares(run_id).unwrap(),
            vec![share(0, 1)]
        );
        assert!(matches!(
            RunOutcome::Refused.into_shares(run_id),
            Err(Error::Refused(id)) if id == run_id
        ));
        assert!(matches!(
            RunOutcome::TimedOut.into_shares(run_id),
            Err(Error::TimedOut(_))
        ));
    }

    #[test]
    fn test_reply_carries_subtree() {
        let mut state = state();
        let run_id = state.run_id();
        state.record_local(3, Contribution::Refused);
        state.merge(vec![share(4, 4)], vec![5]);
        state.begin_forwarding();
        state.merge(vec![share(6, 6)], vec![]);
        assert_eq!(state.phase(), Phase::Forwarding);

        match state.into_reply(3) {
            Message::Reply {
                run_id: id,
                from,
                shares,
                refused,
            } => {
                assert_eq!(id, run_id);
                assert_eq!(from, 3);
                assert_eq!(shares, vec![share(4, 4)]);
                assert_eq!(refused, vec![3, 5]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
