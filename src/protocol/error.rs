use std::fmt;

/// Protocol error taxonomy.
///
/// "Already registered" is deliberately absent: duplicate registration is an
/// idempotent success (`RegisterOutcome::AlreadyRegistered`), not a failure.
#[derive(Debug)]
pub enum PotError {
    /// Chain call reverted or was never confirmed. Fatal to the enclosing
    /// flow; never retried automatically (nonce reuse risk).
    Ledger(String),
    /// Signature mismatch or signer impersonation. Never retried silently.
    Auth(String),
    /// A registration or challenge window lapsed.
    Expired { now: u64, expires_at: u64 },
    /// Unknown pot or attempt id.
    NotFound { kind: &'static str, id: String },
    /// The entity exists but its state machine forbids the operation.
    InvalidState { kind: &'static str, detail: String },
    /// Malformed payload: bad hex, bad JSON, wrong field shape.
    InvalidPayload(String),
    /// Bounded confirmation wait elapsed.
    Timeout { op: &'static str, waited_ms: u64 },
}

impl fmt::Display for PotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger(e) => write!(f, "ledger error: {e}"),
            Self::Auth(e) => write!(f, "authentication error: {e}"),
            Self::Expired { now, expires_at } => {
                write!(f, "expired: now {now} >= expires_at {expires_at}")
            }
            Self::NotFound { kind, id } => write!(f, "{kind} {id} not found"),
            Self::InvalidState { kind, detail } => write!(f, "invalid {kind} state: {detail}"),
            Self::InvalidPayload(e) => write!(f, "invalid payload: {e}"),
            Self::Timeout { op, waited_ms } => {
                write!(f, "{op} not confirmed after {waited_ms}ms")
            }
        }
    }
}

impl std::error::Error for PotError {}

impl From<serde_json::Error> for PotError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(format!("{e}"))
    }
}
