//! Guardian council: proposals, votes, and execution
//!
//! Votes on one proposal are linearized through the council lock; the tally
//! reflects every vote cast before the deadline. A proposal transitions to
//! approved the moment the threshold is reached, and to rejected as soon as
//! the remaining unvoted guardians cannot raise approvals to the threshold.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    canonical, Clock, Ed25519Signature, Ed25519SigningKey, GuardianId, MirrorError, ProposalId,
    Result, Timestamp,
};

use crate::guardian::{Guardian, GuardianStatus};
use crate::threshold::ThresholdSignature;

/// What a proposal asks the council to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    ConstitutionalAmendment,
    GuardianAddition,
    GuardianRemoval,
    ProtocolChange,
    EmergencyAction,
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConstitutionalAmendment => "constitutional_amendment",
            Self::GuardianAddition => "guardian_addition",
            Self::GuardianRemoval => "guardian_removal",
            Self::ProtocolChange => "protocol_change",
            Self::EmergencyAction => "emergency_action",
        };
        f.write_str(s)
    }
}

/// Proposal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Voting,
    Approved,
    Rejected,
    Executed,
}

/// One guardian's signed vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub guardian_id: GuardianId,
    pub approve: bool,
    pub timestamp: Timestamp,
    /// Hex-encoded signature over the canonical vote payload
    pub signature: String,
}

/// The canonical payload a guardian signs when voting
#[derive(Serialize)]
pub struct VotePayload {
    pub proposal_id: ProposalId,
    pub guardian_id: GuardianId,
    pub approve: bool,
    pub timestamp: Timestamp,
}

impl VotePayload {
    /// Canonical bytes for signing and verification.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical::to_canonical_json(self).map_err(|e| MirrorError::serialization(e.to_string()))
    }
}

/// A pending or settled governance proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstitutionalProposal {
    pub proposal_id: ProposalId,
    pub proposal_type: ProposalType,
    pub title: String,
    pub description: String,
    pub proposed_changes: serde_json::Value,
    pub proposed_by: GuardianId,
    pub proposed_at: Timestamp,
    pub voting_deadline: Timestamp,
    pub threshold: usize,
    pub status: ProposalStatus,
    pub votes: BTreeMap<GuardianId, Vote>,
}

impl ConstitutionalProposal {
    /// Count approving votes.
    pub fn approvals(&self) -> usize {
        self.votes.values().filter(|v| v.approve).count()
    }

    /// Count rejecting votes.
    pub fn rejections(&self) -> usize {
        self.votes.values().filter(|v| !v.approve).count()
    }
}

/// The effect `execute_proposal` hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEffect {
    /// Council membership changed; the new active set is attached
    MembershipChanged,
    /// The proposal's changes should be registered as a signed update
    RegisterUpdate(serde_json::Value),
    /// No built-in effect; the caller interprets the changes
    External(serde_json::Value),
}

struct CouncilState {
    guardians: BTreeMap<GuardianId, Guardian>,
    proposals: BTreeMap<ProposalId, ConstitutionalProposal>,
}

/// The guardian council
pub struct GuardianCouncil {
    state: RwLock<CouncilState>,
    default_threshold: usize,
    default_voting_period: Duration,
    clock: Arc<dyn Clock>,
}

impl GuardianCouncil {
    pub fn new(
        guardians: impl IntoIterator<Item = Guardian>,
        default_threshold: usize,
        default_voting_period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let guardians: BTreeMap<GuardianId, Guardian> = guardians
            .into_iter()
            .map(|g| (g.guardian_id, g))
            .collect();
        Self {
            state: RwLock::new(CouncilState {
                guardians,
                proposals: BTreeMap::new(),
            }),
            default_threshold,
            default_voting_period,
            clock,
        }
    }

    /// Current active guardians.
    pub fn active_guardians(&self) -> BTreeMap<GuardianId, Guardian> {
        self.state
            .read()
            .guardians
            .iter()
            .filter(|(_, g)| g.is_active())
            .map(|(id, g)| (*id, g.clone()))
            .collect()
    }

    /// Look up a proposal.
    pub fn proposal(&self, proposal_id: ProposalId) -> Option<ConstitutionalProposal> {
        self.state.read().proposals.get(&proposal_id).cloned()
    }

    /// Add a guardian. Requires a threshold signature from the existing
    /// council over the new guardian's canonical record.
    pub fn add_guardian(
        &self,
        guardian: Guardian,
        authorization: &ThresholdSignature,
    ) -> Result<()> {
        let mut state = self.state.write();
        let message = canonical::to_canonical_json(&guardian)
            .map_err(|e| MirrorError::serialization(e.to_string()))?;
        authorization.verify(&message, &active(&state.guardians))?;
        tracing::info!(guardian = %guardian.guardian_id, name = %guardian.name, "guardian added");
        state.guardians.insert(guardian.guardian_id, guardian);
        Ok(())
    }

    /// Remove a guardian. Requires a threshold signature from the existing
    /// council over the canonical removal statement.
    pub fn remove_guardian(
        &self,
        guardian_id: GuardianId,
        authorization: &ThresholdSignature,
    ) -> Result<()> {
        let mut state = self.state.write();
        let message = canonical::to_canonical_json(&serde_json::json!({
            "action": "remove_guardian",
            "guardian_id": guardian_id,
        }))
        .map_err(|e| MirrorError::serialization(e.to_string()))?;
        authorization.verify(&message, &active(&state.guardians))?;
        let guardian = state
            .guardians
            .get_mut(&guardian_id)
            .ok_or_else(|| MirrorError::not_found(format!("guardian {guardian_id}")))?;
        guardian.status = GuardianStatus::Removed;
        tracing::info!(guardian = %guardian_id, "guardian removed");
        Ok(())
    }

    /// Open a proposal for voting.
    pub fn create_proposal(
        &self,
        proposal_type: ProposalType,
        title: impl Into<String>,
        description: impl Into<String>,
        proposed_changes: serde_json::Value,
        proposed_by: GuardianId,
    ) -> Result<ConstitutionalProposal> {
        let mut state = self.state.write();
        if !state
            .guardians
            .get(&proposed_by)
            .is_some_and(|g| g.is_active())
        {
            return Err(MirrorError::unauthorized(format!(
                "proposer {proposed_by} is not an active guardian"
            )));
        }
        let now = self.clock.now();
        let proposal = ConstitutionalProposal {
            proposal_id: ProposalId::new(),
            proposal_type,
            title: title.into(),
            description: description.into(),
            proposed_changes,
            proposed_by,
            proposed_at: now,
            voting_deadline: now.saturating_add(self.default_voting_period),
            threshold: self.default_threshold,
            status: ProposalStatus::Voting,
            votes: BTreeMap::new(),
        };
        tracing::info!(proposal = %proposal.proposal_id, kind = %proposal_type, "proposal created");
        state.proposals.insert(proposal.proposal_id, proposal.clone());
        Ok(proposal)
    }

    /// Cast a vote. The signature covers the canonical vote payload and is
    /// verified against the guardian's key from current membership.
    pub fn vote(
        &self,
        proposal_id: ProposalId,
        guardian_id: GuardianId,
        approve: bool,
        timestamp: Timestamp,
        signature: &Ed25519Signature,
    ) -> Result<ProposalStatus> {
        let mut state = self.state.write();
        let eligible = active(&state.guardians).len();
        let guardian = state
            .guardians
            .get(&guardian_id)
            .filter(|g| g.is_active())
            .ok_or_else(|| {
                MirrorError::unauthorized(format!("{guardian_id} is not an active guardian"))
            })?;
        let key = guardian.verifying_key()?;

        let payload = VotePayload {
            proposal_id,
            guardian_id,
            approve,
            timestamp,
        };
        key.verify(&payload.canonical_bytes()?, signature)?;

        let now = self.clock.now();
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| MirrorError::not_found(format!("proposal {proposal_id}")))?;

        if now > proposal.voting_deadline {
            settle_on_deadline(proposal);
            return Err(MirrorError::invalid(format!(
                "voting closed at {}",
                proposal.voting_deadline
            )));
        }
        if proposal.status != ProposalStatus::Voting {
            return Err(MirrorError::invalid(format!(
                "proposal is {:?}, not open for voting",
                proposal.status
            )));
        }
        if proposal.votes.contains_key(&guardian_id) {
            return Err(MirrorError::invalid(format!(
                "guardian {guardian_id} already voted on {proposal_id}"
            )));
        }

        proposal.votes.insert(
            guardian_id,
            Vote {
                guardian_id,
                approve,
                timestamp,
                signature: signature.to_hex(),
            },
        );
        tracing::debug!(proposal = %proposal_id, guardian = %guardian_id, approve, "vote recorded");

        // Early transitions: approved at threshold; rejected once the
        // remaining unvoted guardians cannot reach it.
        let approvals = proposal.approvals();
        let remaining = eligible.saturating_sub(proposal.votes.len());
        if approvals >= proposal.threshold {
            proposal.status = ProposalStatus::Approved;
            tracing::info!(proposal = %proposal_id, approvals, "proposal approved");
        } else if approvals + remaining < proposal.threshold {
            proposal.status = ProposalStatus::Rejected;
            tracing::info!(proposal = %proposal_id, approvals, "proposal rejected");
        }
        Ok(proposal.status)
    }

    /// Settle a proposal whose deadline has passed.
    pub fn finalize(&self, proposal_id: ProposalId) -> Result<ProposalStatus> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| MirrorError::not_found(format!("proposal {proposal_id}")))?;
        if proposal.status == ProposalStatus::Voting && now > proposal.voting_deadline {
            settle_on_deadline(proposal);
        }
        Ok(proposal.status)
    }

    /// Execute an approved proposal.
    ///
    /// Every vote signature is re-verified at execution time; a tampered
    /// vote drops out of the tally and can push the proposal back under
    /// threshold, in which case execution fails with `ThresholdNotMet`.
    pub fn execute_proposal(
        &self,
        proposal_id: ProposalId,
        executor: GuardianId,
    ) -> Result<ExecutionEffect> {
        let mut state = self.state.write();
        if !state
            .guardians
            .get(&executor)
            .is_some_and(|g| g.is_active())
        {
            return Err(MirrorError::unauthorized(format!(
                "executor {executor} is not an active guardian"
            )));
        }

        let guardians = active(&state.guardians);
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| MirrorError::not_found(format!("proposal {proposal_id}")))?;

        if proposal.status != ProposalStatus::Approved {
            return Err(MirrorError::threshold_not_met(format!(
                "proposal is {:?}; approvals {} of {}",
                proposal.status,
                proposal.approvals(),
                proposal.threshold
            )));
        }

        // Re-tally with signature verification.
        let mut verified_approvals = 0usize;
        for vote in proposal.votes.values() {
            let Some(guardian) = guardians.get(&vote.guardian_id) else {
                continue;
            };
            let payload = VotePayload {
                proposal_id,
                guardian_id: vote.guardian_id,
                approve: vote.approve,
                timestamp: vote.timestamp,
            };
            let Ok(bytes) = payload.canonical_bytes() else {
                continue;
            };
            let Ok(signature) = Ed25519Signature::from_hex(&vote.signature) else {
                continue;
            };
            let Ok(key) = guardian.verifying_key() else {
                continue;
            };
            if vote.approve && key.verify(&bytes, &signature).is_ok() {
                verified_approvals += 1;
            }
        }
        if verified_approvals < proposal.threshold {
            tracing::warn!(
                proposal = %proposal_id,
                verified_approvals,
                "re-tally found invalid votes; execution refused"
            );
            return Err(MirrorError::threshold_not_met(format!(
                "{verified_approvals} verified approvals of {} required",
                proposal.threshold
            )));
        }

        proposal.status = ProposalStatus::Executed;
        let effect = match proposal.proposal_type {
            ProposalType::GuardianAddition | ProposalType::GuardianRemoval => {
                ExecutionEffect::MembershipChanged
            }
            ProposalType::ConstitutionalAmendment | ProposalType::ProtocolChange => {
                ExecutionEffect::RegisterUpdate(proposal.proposed_changes.clone())
            }
            ProposalType::EmergencyAction => {
                ExecutionEffect::External(proposal.proposed_changes.clone())
            }
        };
        tracing::info!(proposal = %proposal_id, executor = %executor, "proposal executed");
        Ok(effect)
    }
}

fn active(guardians: &BTreeMap<GuardianId, Guardian>) -> BTreeMap<GuardianId, Guardian> {
    guardians
        .iter()
        .filter(|(_, g)| g.is_active())
        .map(|(id, g)| (*id, g.clone()))
        .collect()
}

fn settle_on_deadline(proposal: &mut ConstitutionalProposal) {
    if proposal.status != ProposalStatus::Voting {
        return;
    }
    proposal.status = if proposal.approvals() >= proposal.threshold {
        ProposalStatus::Approved
    } else {
        ProposalStatus::Rejected
    };
}

/// Sign a vote payload with a guardian key (helper for callers and tests).
pub fn sign_vote(
    signer: &Ed25519SigningKey,
    proposal_id: ProposalId,
    guardian_id: GuardianId,
    approve: bool,
    timestamp: Timestamp,
) -> Result<Ed25519Signature> {
    let payload = VotePayload {
        proposal_id,
        guardian_id,
        approve,
        timestamp,
    };
    Ok(signer.sign(&payload.canonical_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardian::GuardianRole;
    use mirror_core::{Ed25519SigningKey, FixedClock};

    struct Fixture {
        council: GuardianCouncil,
        keys: Vec<Ed25519SigningKey>,
        ids: Vec<GuardianId>,
        clock: Arc<FixedClock>,
    }

    fn fixture(n: usize, threshold: usize) -> Fixture {
        let clock = Arc::new(FixedClock::at(Timestamp::from_unix_millis(0)));
        let mut keys = Vec::new();
        let mut guardians = Vec::new();
        for i in 0..n {
            let key = Ed25519SigningKey::generate();
            guardians.push(Guardian::new(
                format!("g{i}"),
                &key.verifying_key(),
                GuardianRole::Appointed,
                Timestamp::from_unix_millis(0),
            ));
            keys.push(key);
        }
        let ids = guardians.iter().map(|g| g.guardian_id).collect();
        let council = GuardianCouncil::new(
            guardians,
            threshold,
            Duration::from_secs(3600),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            council,
            keys,
            ids,
            clock,
        }
    }

    fn cast(fx: &Fixture, proposal_id: ProposalId, voter: usize, approve: bool) -> Result<ProposalStatus> {
        let ts = fx.clock.now();
        let sig = sign_vote(&fx.keys[voter], proposal_id, fx.ids[voter], approve, ts).unwrap();
        fx.council.vote(proposal_id, fx.ids[voter], approve, ts, &sig)
    }

    #[test]
    fn proposal_reaches_threshold_and_executes() {
        let fx = fixture(5, 3);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::ConstitutionalAmendment,
                "amend",
                "test amendment",
                serde_json::json!({"section": "constitution"}),
                fx.ids[0],
            )
            .unwrap();

        assert_eq!(cast(&fx, proposal.proposal_id, 0, true).unwrap(), ProposalStatus::Voting);
        assert_eq!(cast(&fx, proposal.proposal_id, 1, true).unwrap(), ProposalStatus::Voting);
        // Third approval crosses the threshold.
        assert_eq!(cast(&fx, proposal.proposal_id, 2, true).unwrap(), ProposalStatus::Approved);

        let effect = fx
            .council
            .execute_proposal(proposal.proposal_id, fx.ids[0])
            .unwrap();
        assert!(matches!(effect, ExecutionEffect::RegisterUpdate(_)));
        assert_eq!(
            fx.council.proposal(proposal.proposal_id).unwrap().status,
            ProposalStatus::Executed
        );
    }

    #[test]
    fn rejection_when_threshold_unreachable() {
        let fx = fixture(5, 3);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::ProtocolChange,
                "change",
                "",
                serde_json::json!({}),
                fx.ids[0],
            )
            .unwrap();

        // Three rejections leave only two possible approvals: unreachable.
        cast(&fx, proposal.proposal_id, 0, false).unwrap();
        cast(&fx, proposal.proposal_id, 1, false).unwrap();
        let status = cast(&fx, proposal.proposal_id, 2, false).unwrap();
        assert_eq!(status, ProposalStatus::Rejected);

        let err = fx
            .council
            .execute_proposal(proposal.proposal_id, fx.ids[0])
            .unwrap_err();
        assert!(matches!(err, MirrorError::ThresholdNotMet { .. }));
    }

    #[test]
    fn double_vote_rejected() {
        let fx = fixture(3, 2);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::EmergencyAction,
                "act",
                "",
                serde_json::json!({}),
                fx.ids[0],
            )
            .unwrap();
        cast(&fx, proposal.proposal_id, 0, true).unwrap();
        let err = cast(&fx, proposal.proposal_id, 0, true).unwrap_err();
        assert!(matches!(err, MirrorError::Invalid { .. }));
    }

    #[test]
    fn non_guardian_vote_unauthorized() {
        let fx = fixture(3, 2);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::EmergencyAction,
                "act",
                "",
                serde_json::json!({}),
                fx.ids[0],
            )
            .unwrap();
        let stranger_key = Ed25519SigningKey::generate();
        let stranger = GuardianId::new();
        let ts = fx.clock.now();
        let sig = sign_vote(&stranger_key, proposal.proposal_id, stranger, true, ts).unwrap();
        let err = fx
            .council
            .vote(proposal.proposal_id, stranger, true, ts, &sig)
            .unwrap_err();
        assert!(matches!(err, MirrorError::Unauthorized { .. }));
    }

    #[test]
    fn votes_after_deadline_rejected() {
        let fx = fixture(3, 2);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::ProtocolChange,
                "late",
                "",
                serde_json::json!({}),
                fx.ids[0],
            )
            .unwrap();
        cast(&fx, proposal.proposal_id, 0, true).unwrap();

        fx.clock.advance(3601 * 1000);
        let err = cast(&fx, proposal.proposal_id, 1, true).unwrap_err();
        assert!(matches!(err, MirrorError::Invalid { .. }));
        // One approval of two required: settled as rejected.
        assert_eq!(
            fx.council.finalize(proposal.proposal_id).unwrap(),
            ProposalStatus::Rejected
        );
    }

    #[test]
    fn tampered_vote_detected_at_execution() {
        let fx = fixture(5, 3);
        let proposal = fx
            .council
            .create_proposal(
                ProposalType::ConstitutionalAmendment,
                "amend",
                "",
                serde_json::json!({}),
                fx.ids[0],
            )
            .unwrap();
        for voter in 0..3 {
            cast(&fx, proposal.proposal_id, voter, true).unwrap();
        }

        // Flip one vote's approve field behind the signature's back; the
        // stored signature now covers a payload that no longer exists.
        {
            let mut state = fx.council.state.write();
            let stored = state.proposals.get_mut(&proposal.proposal_id).unwrap();
            let vote = stored.votes.get_mut(&fx.ids[1]).unwrap();
            vote.approve = false;
        }

        let err = fx
            .council
            .execute_proposal(proposal.proposal_id, fx.ids[0])
            .unwrap_err();
        assert!(matches!(err, MirrorError::ThresholdNotMet { .. }));
    }

    #[test]
    fn membership_changes_require_threshold_signature() {
        let fx = fixture(3, 2);
        let new_key = Ed25519SigningKey::generate();
        let newcomer = Guardian::new(
            "newcomer",
            &new_key.verifying_key(),
            GuardianRole::Elected,
            Timestamp::from_unix_millis(5),
        );
        let message = canonical::to_canonical_json(&newcomer).unwrap();

        // One signature is not enough for threshold 2.
        let mut auth = ThresholdSignature::new(2);
        auth.add(fx.ids[0], fx.keys[0].sign(&message));
        assert!(fx.council.add_guardian(newcomer.clone(), &auth).is_err());

        auth.add(fx.ids[1], fx.keys[1].sign(&message));
        fx.council.add_guardian(newcomer.clone(), &auth).unwrap();
        assert!(fx
            .council
            .active_guardians()
            .contains_key(&newcomer.guardian_id));
    }
}
