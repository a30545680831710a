//! Pot lifecycle: registration, resolution, expiry sweeping.
//!
//! The ledger owns the fund-bearing fields; this manager owns the
//! registration record (password, legend snapshot, signed claims). State
//! machine: `Created → Attempted → Resolved`, where `Attempted` is entered
//! when a challenge set is first issued and `Resolved` is terminal.

use crate::Address;
use crate::config::VerifierConfig;
use crate::protocol::error::PotError;
use crate::protocol::ledger::{MemoryLedger, PotId, PotStatus, unix_now};
use crate::protocol::legend::Legend;
use crate::protocol::wallet::{SignedEnvelope, require_signer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The creator-signed registration claims. Wire field names follow the
/// protocol: `1p` is the password, `iss`/`iat`/`exp` the claim trio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub pot_id: String,
    #[serde(rename = "1p")]
    pub password: String,
    pub legend: Legend,
    pub iat: u64,
    pub iss: Address,
    pub exp: u64,
    pub chain_id: u64,
}

/// Stored registration record for one pot.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub pot_id: PotId,
    pub password: char,
    pub legend: Legend,
    pub issuer: Address,
    pub iat: u64,
    pub exp: u64,
    pub registered_at: u64,
}

/// Registration result. Duplicates are absorbed, not failed, so clients can
/// retry safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// How a pot resolves.
#[derive(Debug, Clone, Copy)]
pub enum PotOutcome {
    /// A hunter proved the password; funds release to them.
    HunterWon(Address),
    /// Duration elapsed; funds return to the creator.
    Expired,
}

pub struct PotManager {
    ledger: Arc<MemoryLedger>,
    config: Arc<VerifierConfig>,
    registrations: Mutex<HashMap<PotId, Registration>>,
}

impl PotManager {
    pub fn new(ledger: Arc<MemoryLedger>, config: Arc<VerifierConfig>) -> Self {
        Self {
            ledger,
            config,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }

    /// Create a pot on the ledger, waiting (bounded) for confirmation and
    /// decoding the assigned id from the receipt's events.
    pub async fn create_pot(
        &self,
        creator: Address,
        amount: u64,
        duration_secs: u64,
        fee: u64,
        designated_hunter: Option<Address>,
    ) -> Result<PotId, PotError> {
        let fut = self
            .ledger
            .create_pot(creator, amount, duration_secs, fee, designated_hunter);
        let receipt = tokio::time::timeout(self.config.confirmation_timeout, fut)
            .await
            .map_err(|_| PotError::Timeout {
                op: "createPot",
                waited_ms: self.config.confirmation_timeout.as_millis() as u64,
            })??;
        receipt
            .pot_id()
            .ok_or_else(|| PotError::Ledger("no PotCreated event in receipt".to_string()))
    }

    /// Register a pot's password and legend snapshot from a creator-signed
    /// envelope. Validates, in order: payload shape, chain binding, signer
    /// against the claimed issuer, the `iat <= now < exp` window (capped at
    /// the configured registration TTL), legend bijectivity, and that the
    /// pot exists on the ledger in `Created` status. Duplicate registrations
    /// are idempotent.
    pub async fn register(&self, envelope: &SignedEnvelope) -> Result<RegisterOutcome, PotError> {
        let (bytes, signer) = envelope.open()?;
        let payload: RegisterPayload = serde_json::from_slice(&bytes)?;

        if payload.chain_id != self.config.chain.chain_id {
            return Err(PotError::InvalidPayload(format!(
                "chain_id {} not served here (expected {})",
                payload.chain_id, self.config.chain.chain_id
            )));
        }
        require_signer(signer, payload.iss)?;

        let now = unix_now();
        if payload.iat > now {
            return Err(PotError::InvalidPayload(format!(
                "iat {} is in the future (now {now})",
                payload.iat
            )));
        }
        if now >= payload.exp {
            return Err(PotError::Expired {
                now,
                expires_at: payload.exp,
            });
        }
        // A payload cannot claim a longer validity window than the verifier
        // grants; otherwise exp is client-chosen and the TTL means nothing.
        if payload.exp > now + self.config.registration_ttl_secs {
            return Err(PotError::InvalidPayload(format!(
                "exp {} exceeds the {}s registration window",
                payload.exp, self.config.registration_ttl_secs
            )));
        }

        let mut chars = payload.password.chars();
        let password = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(PotError::InvalidPayload(
                    "password must be exactly one character".to_string(),
                ));
            }
        };
        payload.legend.validate()?;

        let pot_id: PotId = payload
            .pot_id
            .parse()
            .map_err(|_| PotError::InvalidPayload(format!("pot_id {:?}", payload.pot_id)))?;
        let pot = self.ledger.get_pot(pot_id).await?;
        if pot.status != PotStatus::Created {
            return Err(PotError::InvalidState {
                kind: "pot",
                detail: format!("pot {pot_id} is {:?}, registration closed", pot.status),
            });
        }

        // Atomic insert-if-absent: exactly one registration record survives
        // concurrent duplicates; everyone else observes "already registered".
        let mut registrations = self.registrations.lock().await;
        match registrations.entry(pot_id) {
            Entry::Occupied(_) => Ok(RegisterOutcome::AlreadyRegistered),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    pot_id,
                    password,
                    legend: payload.legend,
                    issuer: payload.iss,
                    iat: payload.iat,
                    exp: payload.exp,
                    registered_at: now,
                });
                tracing::info!(pot_id, issuer = %payload.iss, "pot registered");
                Ok(RegisterOutcome::Registered)
            }
        }
    }

    /// Resolve a pot. Terminal and idempotent: resolving an already-resolved
    /// pot is a no-op.
    pub async fn resolve(&self, pot_id: PotId, outcome: PotOutcome) -> Result<(), PotError> {
        let winner = match outcome {
            PotOutcome::HunterWon(hunter) => Some(hunter),
            PotOutcome::Expired => None,
        };
        self.ledger.resolve_pot(pot_id, winner).await?;
        Ok(())
    }

    pub async fn registration(&self, pot_id: PotId) -> Option<Registration> {
        self.registrations.lock().await.get(&pot_id).cloned()
    }

    /// Drop a registration record (diagnostic endpoint only).
    pub async fn remove_registration(&self, pot_id: PotId) -> bool {
        self.registrations.lock().await.remove(&pot_id).is_some()
    }

    /// One sweep pass: resolve every pot whose duration elapsed, returning
    /// funds to creators. Safe to run concurrently with the request path —
    /// resolution is idempotent.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.ledger.expired_pots(unix_now()).await;
        let mut swept = 0;
        for pot_id in expired {
            match self.resolve(pot_id, PotOutcome::Expired).await {
                Ok(()) => {
                    swept += 1;
                    tracing::info!(pot_id, "expired pot swept, funds returned to creator");
                }
                Err(e) => tracing::warn!(pot_id, error = %e, "expiry sweep failed"),
            }
        }
        swept
    }
}

/// Spawn the background expiry sweeper.
pub fn start_sweeper(
    pots: Arc<PotManager>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            pots.sweep_expired().await;
        }
    })
}
