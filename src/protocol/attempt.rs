//! Attempt authentication: challenge issuance and answer scoring.
//!
//! `Requested → Challenged → Succeeded | Failed | Expired`. Challenge sets
//! are issued once per attempt (the conservative replay policy: a second
//! issuance request is rejected rather than resetting prior state), and
//! settling is single-flight — the first verifier call decides the outcome,
//! later calls observe the settled result.

use crate::Address;
use crate::config::VerifierConfig;
use crate::protocol::error::PotError;
use crate::protocol::ledger::{AttemptId, AttemptStatus, MemoryLedger, PotId};
use crate::protocol::pot::{PotManager, PotOutcome};
use crate::protocol::puzzle::{Challenge, generate_challenges};
use crate::protocol::wallet::SignedEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Hunter-signed request for a challenge set. The signature is computed over
/// the attempt id string itself, binding the request to that attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOptionsPayload {
    pub attempt_id: String,
    pub chain_id: u64,
}

/// Hunter-signed answer submission. The signature is computed over the
/// challenge id string, binding answers to the issued set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptVerifyPayload {
    pub challenge_id: String,
    pub solutions: Vec<String>,
    pub chain_id: u64,
}

/// An issued challenge set, alive for the attempt's lifetime only.
#[derive(Debug, Clone)]
pub struct ChallengeSet {
    pub challenge_id: String,
    pub attempt_id: AttemptId,
    pub pot_id: PotId,
    pub hunter: Address,
    pub challenges: Vec<Challenge>,
    /// First-writer-wins settlement: `Some(outcome)` once scored.
    pub settled: Option<bool>,
}

/// What `issue_challenges` hands back to the hunter.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedChallenges {
    pub challenge_id: String,
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    /// True when a prior call already settled this attempt; the outcome
    /// reported is the original one, not a second scoring pass.
    pub already_settled: bool,
}

#[derive(Default)]
struct SetStore {
    by_attempt: HashMap<AttemptId, ChallengeSet>,
    by_challenge: HashMap<String, AttemptId>,
}

pub struct AttemptAuthenticator {
    ledger: Arc<MemoryLedger>,
    pots: Arc<PotManager>,
    config: Arc<VerifierConfig>,
    sets: Mutex<SetStore>,
}

impl AttemptAuthenticator {
    pub fn new(
        ledger: Arc<MemoryLedger>,
        pots: Arc<PotManager>,
        config: Arc<VerifierConfig>,
    ) -> Self {
        Self {
            ledger,
            pots,
            config,
            sets: Mutex::new(SetStore::default()),
        }
    }

    /// Request an attempt on the ledger, bounded-wait for confirmation, and
    /// decode the assigned attempt id from the receipt's events.
    pub async fn request_attempt(
        &self,
        pot_id: PotId,
        hunter: Address,
    ) -> Result<AttemptId, PotError> {
        let fut = self.ledger.attempt_pot(pot_id, hunter);
        let receipt = tokio::time::timeout(self.config.confirmation_timeout, fut)
            .await
            .map_err(|_| PotError::Timeout {
                op: "attemptPot",
                waited_ms: self.config.confirmation_timeout.as_millis() as u64,
            })??;
        receipt
            .attempt_id()
            .ok_or_else(|| PotError::Ledger("no PotAttempted event in receipt".to_string()))
    }

    /// Issue the attempt's challenge set from a hunter-signed request.
    ///
    /// Validates the chain binding, that the signer is the attempt's hunter,
    /// and that the signed message is exactly the attempt id. One issuance
    /// per attempt: a repeat request is rejected, never regenerated.
    pub async fn issue_challenges(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<IssuedChallenges, PotError> {
        let bytes = envelope.payload_bytes()?;
        let payload: AttemptOptionsPayload = serde_json::from_slice(&bytes)?;
        if payload.chain_id != self.config.chain.chain_id {
            return Err(PotError::InvalidPayload(format!(
                "chain_id {} not served here (expected {})",
                payload.chain_id, self.config.chain.chain_id
            )));
        }
        let (_, signer) = envelope.open_with_message(&payload.attempt_id)?;

        let attempt_id: AttemptId = payload
            .attempt_id
            .parse()
            .map_err(|_| PotError::InvalidPayload(format!("attempt_id {:?}", payload.attempt_id)))?;
        let attempt = self.ledger.get_attempt(attempt_id).await?;
        if signer != attempt.hunter {
            return Err(PotError::Auth(format!(
                "challenge request signed by {signer}, attempt {attempt_id} belongs to {}",
                attempt.hunter
            )));
        }
        // Challenges are only meaningful for a registered pot.
        if self.pots.registration(attempt.pot_id).await.is_none() {
            return Err(PotError::NotFound {
                kind: "registration",
                id: attempt.pot_id.to_string(),
            });
        }

        let mut sets = self.sets.lock().await;
        if sets.by_attempt.contains_key(&attempt_id) {
            return Err(PotError::InvalidState {
                kind: "attempt",
                detail: format!("challenges already issued for attempt {attempt_id}"),
            });
        }
        // Requested → Challenged; also enters the pot into Attempted.
        self.ledger.mark_attempt_challenged(attempt_id).await?;
        self.ledger.mark_pot_attempted(attempt.pot_id).await?;

        let challenges = generate_challenges(self.config.rounds, &mut rand::thread_rng());
        let challenge_id = Uuid::new_v4().to_string();
        let set = ChallengeSet {
            challenge_id: challenge_id.clone(),
            attempt_id,
            pot_id: attempt.pot_id,
            hunter: attempt.hunter,
            challenges: challenges.clone(),
            settled: None,
        };
        sets.by_challenge.insert(challenge_id.clone(), attempt_id);
        sets.by_attempt.insert(attempt_id, set);

        tracing::info!(
            attempt_id,
            pot_id = attempt.pot_id,
            rounds = challenges.len(),
            "challenges issued"
        );
        Ok(IssuedChallenges {
            challenge_id,
            challenges,
        })
    }

    /// Score a hunter-signed answer set: all rounds must match the direction
    /// implied by composing each round's partition with the pot's legend.
    /// On success the attempt succeeds and the pot resolves to the hunter;
    /// on failure the attempt fails but the pot stays open for re-attempts.
    pub async fn verify_answers(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<VerifyOutcome, PotError> {
        let bytes = envelope.payload_bytes()?;
        let payload: AttemptVerifyPayload = serde_json::from_slice(&bytes)?;
        if payload.chain_id != self.config.chain.chain_id {
            return Err(PotError::InvalidPayload(format!(
                "chain_id {} not served here (expected {})",
                payload.chain_id, self.config.chain.chain_id
            )));
        }
        let (_, signer) = envelope.open_with_message(&payload.challenge_id)?;

        // Hold the set lock through scoring and settlement: concurrent
        // verifies for one attempt serialize, and only the first scores.
        let mut sets = self.sets.lock().await;
        let attempt_id = *sets.by_challenge.get(&payload.challenge_id).ok_or_else(|| {
            PotError::NotFound {
                kind: "challenge set",
                id: payload.challenge_id.clone(),
            }
        })?;
        let set = sets
            .by_attempt
            .get(&attempt_id)
            .ok_or(PotError::NotFound {
                kind: "attempt",
                id: attempt_id.to_string(),
            })?;
        if signer != set.hunter {
            return Err(PotError::Auth(format!(
                "answers signed by {signer}, attempt {attempt_id} belongs to {}",
                set.hunter
            )));
        }
        if let Some(previous) = set.settled {
            return Ok(VerifyOutcome {
                success: previous,
                already_settled: true,
            });
        }
        if payload.solutions.len() != set.challenges.len() {
            return Err(PotError::InvalidPayload(format!(
                "expected {} solutions, got {}",
                set.challenges.len(),
                payload.solutions.len()
            )));
        }

        let registration =
            self.pots
                .registration(set.pot_id)
                .await
                .ok_or(PotError::NotFound {
                    kind: "registration",
                    id: set.pot_id.to_string(),
                })?;

        // AND semantics: a single wrong round fails the whole attempt.
        let mut success = true;
        for (challenge, answer) in set.challenges.iter().zip(&payload.solutions) {
            let Some(submitted) = crate::protocol::legend::Direction::from_symbol(answer) else {
                return Err(PotError::InvalidPayload(format!(
                    "unknown direction symbol {answer:?}"
                )));
            };
            let expected =
                challenge.expected_direction(registration.password, &registration.legend);
            if expected != Some(submitted) {
                success = false;
            }
        }

        let (pot_id, hunter) = (set.pot_id, set.hunter);
        let status = if success {
            AttemptStatus::Succeeded
        } else {
            AttemptStatus::Failed
        };
        // Settle the ledger first: if the attempt was expired out from under
        // us by the sweeper, the settled flag must not be written.
        self.ledger.settle_attempt(attempt_id, status).await?;
        if let Some(set) = sets.by_attempt.get_mut(&attempt_id) {
            set.settled = Some(success);
        }
        drop(sets);

        if success {
            self.pots
                .resolve(pot_id, PotOutcome::HunterWon(hunter))
                .await?;
        }
        tracing::info!(attempt_id, pot_id, success, "attempt verified");
        Ok(VerifyOutcome {
            success,
            already_settled: false,
        })
    }
}
