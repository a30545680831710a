//! In-process escrow ledger realizing the on-chain contract interface.
//!
//! Mirrors the contract's observable behavior: `create_pot` and `attempt_pot`
//! are event-emitting — the assigned ids are not return values but must be
//! decoded from the emitted events in the receipt, exactly as a client
//! decodes `PotCreated`/`PotAttempted` logs from a transaction receipt.
//! Fund movement is the ledger's job alone; the lifecycle manager only
//! requests it.

use crate::Address;
use crate::protocol::error::PotError;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub type PotId = u64;
pub type AttemptId = u64;

/// Current unix time, seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PotStatus {
    Created,
    Attempted,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Requested,
    Challenged,
    Succeeded,
    Failed,
    Expired,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PotRecord {
    pub id: PotId,
    pub creator: Address,
    pub amount: u64,
    pub duration_secs: u64,
    pub fee: u64,
    /// Optional single-factor binding: only this hunter may attempt.
    pub designated_hunter: Option<Address>,
    pub created_at: u64,
    pub status: PotStatus,
    /// Total value locked: the initial amount plus collected attempt fees.
    pub balance: u64,
}

impl PotRecord {
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.duration_secs)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub pot_id: PotId,
    pub hunter: Address,
    pub timestamp: u64,
    pub status: AttemptStatus,
}

/// Events emitted by ledger transactions. Ids are observable only here.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    PotCreated { id: PotId },
    PotAttempted { pot_id: PotId, attempt_id: AttemptId },
    PotResolved { id: PotId, winner: Option<Address> },
}

/// Receipt of a confirmed ledger transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub block: u64,
    pub events: Vec<LedgerEvent>,
}

impl TxReceipt {
    /// Decode the assigned pot id from a creation receipt.
    pub fn pot_id(&self) -> Option<PotId> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::PotCreated { id } => Some(*id),
            _ => None,
        })
    }

    /// Decode the assigned attempt id from an attempt receipt.
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::PotAttempted { attempt_id, .. } => Some(*attempt_id),
            _ => None,
        })
    }
}

struct LedgerInner {
    next_pot_id: PotId,
    next_attempt_id: AttemptId,
    block: u64,
    pots: HashMap<PotId, PotRecord>,
    attempts: HashMap<AttemptId, AttemptRecord>,
    balances: HashMap<Address, u64>,
}

/// In-memory escrow ledger.
pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
    /// Artificial confirmation latency, so callers exercise their bounded
    /// waits the way they would against a real chain.
    confirmation_delay: Duration,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_confirmation_delay(Duration::ZERO)
    }

    pub fn with_confirmation_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                next_pot_id: 1,
                next_attempt_id: 1,
                block: 0,
                pots: HashMap::new(),
                attempts: HashMap::new(),
                balances: HashMap::new(),
            }),
            confirmation_delay: delay,
        }
    }

    async fn confirm(&self) {
        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }
    }

    /// Credit an account (test faucet).
    pub async fn credit(&self, who: Address, amount: u64) {
        let mut inner = self.inner.lock().await;
        *inner.balances.entry(who).or_insert(0) += amount;
    }

    pub async fn balance_of(&self, who: Address) -> u64 {
        self.inner.lock().await.balances.get(&who).copied().unwrap_or(0)
    }

    /// `createPot(amount, duration, fee, designatedHunter)`: locks `amount`
    /// from the creator's balance. The assigned id is emitted, not returned.
    pub async fn create_pot(
        &self,
        creator: Address,
        amount: u64,
        duration_secs: u64,
        fee: u64,
        designated_hunter: Option<Address>,
    ) -> Result<TxReceipt, PotError> {
        if amount == 0 {
            return Err(PotError::Ledger("pot amount must be > 0".to_string()));
        }
        self.confirm().await;
        let mut inner = self.inner.lock().await;
        let available = inner.balances.get(&creator).copied().unwrap_or(0);
        if available < amount {
            return Err(PotError::Ledger(format!(
                "create reverted: creator balance {available} < amount {amount}"
            )));
        }
        if let Some(b) = inner.balances.get_mut(&creator) {
            *b -= amount;
        }
        let id = inner.next_pot_id;
        inner.next_pot_id += 1;
        inner.block += 1;
        let block = inner.block;
        inner.pots.insert(
            id,
            PotRecord {
                id,
                creator,
                amount,
                duration_secs,
                fee,
                designated_hunter,
                created_at: unix_now(),
                status: PotStatus::Created,
                balance: amount,
            },
        );
        tracing::info!(pot_id = id, amount, duration_secs, fee, "pot created");
        Ok(TxReceipt {
            block,
            events: vec![LedgerEvent::PotCreated { id }],
        })
    }

    /// `attemptPot(potId)`: admits a hunting try, charging the entry fee into
    /// the pot. Rejects resolved/expired pots, foreign hunters on designated
    /// pots, and a second attempt by a hunter whose previous attempt on the
    /// pot has not yet settled.
    pub async fn attempt_pot(
        &self,
        pot_id: PotId,
        hunter: Address,
    ) -> Result<TxReceipt, PotError> {
        self.confirm().await;
        let mut inner = self.inner.lock().await;
        let now = unix_now();

        let pot = inner.pots.get(&pot_id).ok_or(PotError::NotFound {
            kind: "pot",
            id: pot_id.to_string(),
        })?;
        if pot.status == PotStatus::Resolved {
            return Err(PotError::InvalidState {
                kind: "pot",
                detail: format!("pot {pot_id} already resolved"),
            });
        }
        if pot.is_expired(now) {
            return Err(PotError::Expired {
                now,
                expires_at: pot.expires_at(),
            });
        }
        if let Some(designated) = pot.designated_hunter
            && designated != hunter
        {
            return Err(PotError::Auth(format!(
                "pot {pot_id} is bound to hunter {designated}, not {hunter}"
            )));
        }
        // At most one live attempt per hunter per pot: anything short of a
        // terminal outcome (Requested or Challenged) blocks a new admission,
        // so a hunter cannot hold two challenge sets in flight.
        if inner
            .attempts
            .values()
            .any(|a| a.pot_id == pot_id && a.hunter == hunter && !a.status.is_terminal())
        {
            return Err(PotError::InvalidState {
                kind: "attempt",
                detail: format!("hunter {hunter} already has an open attempt on pot {pot_id}"),
            });
        }

        let fee = pot.fee;
        let available = inner.balances.get(&hunter).copied().unwrap_or(0);
        if available < fee {
            return Err(PotError::Ledger(format!(
                "attempt reverted: hunter balance {available} < fee {fee}"
            )));
        }
        if let Some(b) = inner.balances.get_mut(&hunter) {
            *b -= fee;
        }
        if let Some(pot) = inner.pots.get_mut(&pot_id) {
            pot.balance += fee;
        }

        let attempt_id = inner.next_attempt_id;
        inner.next_attempt_id += 1;
        inner.block += 1;
        let block = inner.block;
        inner.attempts.insert(
            attempt_id,
            AttemptRecord {
                id: attempt_id,
                pot_id,
                hunter,
                timestamp: now,
                status: AttemptStatus::Requested,
            },
        );
        tracing::info!(pot_id, attempt_id, hunter = %hunter, "attempt requested");
        Ok(TxReceipt {
            block,
            events: vec![LedgerEvent::PotAttempted { pot_id, attempt_id }],
        })
    }

    pub async fn get_pot(&self, pot_id: PotId) -> Result<PotRecord, PotError> {
        self.inner
            .lock()
            .await
            .pots
            .get(&pot_id)
            .cloned()
            .ok_or(PotError::NotFound {
                kind: "pot",
                id: pot_id.to_string(),
            })
    }

    pub async fn get_attempt(&self, attempt_id: AttemptId) -> Result<AttemptRecord, PotError> {
        self.inner
            .lock()
            .await
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or(PotError::NotFound {
                kind: "attempt",
                id: attempt_id.to_string(),
            })
    }

    /// Pot ids whose duration elapsed without resolution.
    pub async fn expired_pots(&self, now: u64) -> Vec<PotId> {
        self.inner
            .lock()
            .await
            .pots
            .values()
            .filter(|p| p.status != PotStatus::Resolved && p.is_expired(now))
            .map(|p| p.id)
            .collect()
    }

    /// Pot enters `Attempted` the moment a challenge set is issued.
    pub async fn mark_pot_attempted(&self, pot_id: PotId) -> Result<(), PotError> {
        let mut inner = self.inner.lock().await;
        let pot = inner.pots.get_mut(&pot_id).ok_or(PotError::NotFound {
            kind: "pot",
            id: pot_id.to_string(),
        })?;
        if pot.status == PotStatus::Created {
            pot.status = PotStatus::Attempted;
        }
        Ok(())
    }

    /// Transition an attempt to `Challenged`. Rejected unless `Requested`.
    pub async fn mark_attempt_challenged(&self, attempt_id: AttemptId) -> Result<(), PotError> {
        let mut inner = self.inner.lock().await;
        let attempt = inner
            .attempts
            .get_mut(&attempt_id)
            .ok_or(PotError::NotFound {
                kind: "attempt",
                id: attempt_id.to_string(),
            })?;
        if attempt.status != AttemptStatus::Requested {
            return Err(PotError::InvalidState {
                kind: "attempt",
                detail: format!(
                    "attempt {attempt_id} is {:?}, challenges already issued or settled",
                    attempt.status
                ),
            });
        }
        attempt.status = AttemptStatus::Challenged;
        Ok(())
    }

    /// Settle an attempt's terminal outcome. Terminal outcomes never mutate.
    pub async fn settle_attempt(
        &self,
        attempt_id: AttemptId,
        status: AttemptStatus,
    ) -> Result<(), PotError> {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.lock().await;
        let attempt = inner
            .attempts
            .get_mut(&attempt_id)
            .ok_or(PotError::NotFound {
                kind: "attempt",
                id: attempt_id.to_string(),
            })?;
        if attempt.status.is_terminal() {
            return Err(PotError::InvalidState {
                kind: "attempt",
                detail: format!("attempt {attempt_id} already settled as {:?}", attempt.status),
            });
        }
        attempt.status = status;
        tracing::info!(attempt_id, ?status, "attempt settled");
        Ok(())
    }

    /// Resolve a pot, releasing its whole balance to the winner (successful
    /// hunter) or back to the creator (failure/expiry). Idempotent: a second
    /// resolve of the same pot is a no-op.
    pub async fn resolve_pot(
        &self,
        pot_id: PotId,
        winner: Option<Address>,
    ) -> Result<TxReceipt, PotError> {
        let mut inner = self.inner.lock().await;
        let pot = inner.pots.get(&pot_id).ok_or(PotError::NotFound {
            kind: "pot",
            id: pot_id.to_string(),
        })?;
        if pot.status == PotStatus::Resolved {
            let block = inner.block;
            return Ok(TxReceipt {
                block,
                events: vec![],
            });
        }
        let payout = pot.balance;
        let recipient = winner.unwrap_or(pot.creator);
        if let Some(pot) = inner.pots.get_mut(&pot_id) {
            pot.status = PotStatus::Resolved;
            pot.balance = 0;
        }
        *inner.balances.entry(recipient).or_insert(0) += payout;
        // Any attempt still open against this pot expires with it.
        for attempt in inner.attempts.values_mut() {
            if attempt.pot_id == pot_id && !attempt.status.is_terminal() {
                attempt.status = AttemptStatus::Expired;
            }
        }
        inner.block += 1;
        let block = inner.block;
        tracing::info!(pot_id, winner = ?winner, payout, "pot resolved");
        Ok(TxReceipt {
            block,
            events: vec![LedgerEvent::PotResolved {
                id: pot_id,
                winner,
            }],
        })
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
