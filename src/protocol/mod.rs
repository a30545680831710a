pub mod attempt;
pub mod error;
pub mod ledger;
pub mod legend;
pub mod pot;
pub mod puzzle;
pub mod wallet;

pub use attempt::{AttemptAuthenticator, IssuedChallenges, VerifyOutcome};
pub use error::PotError;
pub use ledger::{AttemptId, AttemptStatus, MemoryLedger, PotId, PotStatus, unix_now};
pub use legend::{Color, Direction, Legend, LegendRegistry};
pub use pot::{PotManager, PotOutcome, RegisterOutcome, RegisterPayload};
pub use puzzle::Challenge;
pub use wallet::SignedEnvelope;
