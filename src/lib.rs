//! Money Pot Lab
//!
//! Two-party escrow protocol: a creator locks funds into a pot and registers
//! a one-character password with a verifier; a hunter claims the pot by
//! answering randomized color-partition challenges whose correct directions
//! only a password-holder can derive.
//!
//! ## Running the verifier
//! ```bash
//! cargo run --bin api
//! ```

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Keypair, Message, SECP256K1, SecretKey};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

pub mod api;
pub mod config;
pub mod protocol;

/// A 20-byte wallet identity, rendered as lowercase `0x`-hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| format!("invalid address hex: {e}"))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| "address must be 20 bytes".to_string())?;
        Ok(Address(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a message the personal-sign way: prefix with
/// `"\x19Ethereum Signed Message:\n" + decimal length` before digesting.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// Generate a new ECDSA keypair. Returns the keypair and its wallet address.
pub fn generate_keypair() -> (Keypair, Address) {
    let kp = Keypair::new(SECP256K1, &mut rand::thread_rng());
    let addr = address_of(&kp.public_key());
    (kp, addr)
}

/// Derive the wallet address from a public key: last 20 bytes of the
/// Keccak-256 of the uncompressed point (tag byte dropped).
pub fn address_of(pk: &secp256k1::PublicKey) -> Address {
    let uncompressed = pk.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Address(addr)
}

/// Sign a message with the personal-sign scheme.
/// Returns the 65-byte signature: 64-byte compact sig + recovery byte (27/28).
pub fn sign_message(message: &[u8], kp: &Keypair) -> [u8; 65] {
    let digest = personal_message_hash(message);
    let msg = Message::from_digest(digest);
    let sk = SecretKey::from_keypair(kp);
    let sig = SECP256K1.sign_ecdsa_recoverable(&msg, &sk);
    let (rec_id, compact) = sig.serialize_compact();
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = 27 + rec_id.to_i32() as u8;
    out
}

/// Sign a message and return the wire form: `0x`-hex of the 65 bytes.
pub fn sign_message_hex(message: &[u8], kp: &Keypair) -> String {
    format!("0x{}", hex::encode(sign_message(message, kp)))
}

/// Parse a `0x`-hex 65-byte signature.
pub fn parse_signature(hex_str: &str) -> Result<[u8; 65], String> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(stripped).map_err(|e| format!("invalid signature hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| "signature must be 65 bytes (64-byte compact + recovery byte)".to_string())
}

/// Recover the signer address of a personal-sign signature over `message`.
pub fn recover_signer(message: &[u8], sig: &[u8; 65]) -> Result<Address, String> {
    let rec_byte = sig[64];
    // Accept both the bare {0,1} and the offset {27,28} recovery encodings.
    let rec_val = if rec_byte >= 27 { rec_byte - 27 } else { rec_byte };
    let rec_id = RecoveryId::from_i32(rec_val as i32)
        .map_err(|e| format!("invalid recovery id {rec_byte}: {e}"))?;
    let recoverable = RecoverableSignature::from_compact(&sig[..64], rec_id)
        .map_err(|e| format!("malformed signature: {e}"))?;
    let digest = personal_message_hash(message);
    let msg = Message::from_digest(digest);
    let pk = SECP256K1
        .recover_ecdsa(&msg, &recoverable)
        .map_err(|e| format!("signature recovery failed: {e}"))?;
    Ok(address_of(&pk))
}
