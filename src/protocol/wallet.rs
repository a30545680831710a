//! Wallet signature binding for protocol messages.
//!
//! Every POST body carries `{encrypted_payload: hex(JSON bytes), signature}`.
//! The signature is computed over the exact byte sequence that gets
//! hex-encoded — never over an independent re-serialization. `seal_value`
//! serializes once and signs those same bytes; `open` decodes the hex and
//! recovers the signer over exactly those bytes, so one flipped byte in
//! either payload or signature breaks recovery or shifts the recovered
//! address away from the claimed issuer.

use crate::protocol::error::PotError;
use crate::{Address, parse_signature, recover_signer, sign_message_hex};
use secp256k1::Keypair;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Hex-encoded payload bytes. (Named for the wire protocol; the demo
    /// deployment hex-encodes without an additional cipher layer.)
    pub encrypted_payload: String,
    /// `0x`-hex 65-byte recoverable signature.
    pub signature: String,
}

impl SignedEnvelope {
    /// Sign the exact bytes and wrap them. The caller keeps no other
    /// serialization around, so signed bytes and transmitted bytes match.
    pub fn seal(payload_bytes: &[u8], kp: &Keypair) -> SignedEnvelope {
        SignedEnvelope {
            encrypted_payload: hex::encode(payload_bytes),
            signature: sign_message_hex(payload_bytes, kp),
        }
    }

    /// Serialize `payload` once, then seal those bytes.
    pub fn seal_value<T: Serialize>(payload: &T, kp: &Keypair) -> Result<SignedEnvelope, PotError> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::seal(&bytes, kp))
    }

    /// Wrap payload bytes with a signature over a detached message instead
    /// of the payload itself (attempt-id / challenge-id binding).
    pub fn seal_with_message<T: Serialize>(
        payload: &T,
        message: &str,
        kp: &Keypair,
    ) -> Result<SignedEnvelope, PotError> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(SignedEnvelope {
            encrypted_payload: hex::encode(bytes),
            signature: sign_message_hex(message.as_bytes(), kp),
        })
    }

    /// Decode the payload bytes without touching the signature.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, PotError> {
        hex::decode(&self.encrypted_payload)
            .map_err(|e| PotError::InvalidPayload(format!("payload hex: {e}")))
    }

    /// Recover the signer over the transmitted payload bytes themselves.
    pub fn open(&self) -> Result<(Vec<u8>, Address), PotError> {
        let bytes = self.payload_bytes()?;
        let signer = self.recover_over(&bytes)?;
        Ok((bytes, signer))
    }

    /// Recover the signer over a detached message (e.g. the attempt id the
    /// request is bound to), returning it alongside the payload bytes.
    pub fn open_with_message(&self, message: &str) -> Result<(Vec<u8>, Address), PotError> {
        let bytes = self.payload_bytes()?;
        let signer = self.recover_over(message.as_bytes())?;
        Ok((bytes, signer))
    }

    fn recover_over(&self, message: &[u8]) -> Result<Address, PotError> {
        let sig = parse_signature(&self.signature).map_err(PotError::InvalidPayload)?;
        recover_signer(message, &sig).map_err(PotError::Auth)
    }
}

/// Enforce that the recovered signer matches the payload's claimed issuer.
pub fn require_signer(recovered: Address, claimed: Address) -> Result<(), PotError> {
    if recovered != claimed {
        return Err(PotError::Auth(format!(
            "signature recovered to {recovered}, payload claims issuer {claimed}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_keypair;

    #[derive(Serialize, Deserialize)]
    struct Sample {
        pot_id: String,
        iss: Address,
    }

    #[test]
    fn seal_open_recovers_signer() {
        let (kp, addr) = generate_keypair();
        let payload = Sample {
            pot_id: "7".to_string(),
            iss: addr,
        };
        let envelope = SignedEnvelope::seal_value(&payload, &kp).unwrap();
        let (bytes, signer) = envelope.open().unwrap();
        assert_eq!(signer, addr);
        let back: Sample = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.pot_id, "7");
        require_signer(signer, back.iss).unwrap();
    }

    #[test]
    fn flipped_payload_byte_rejected() {
        let (kp, addr) = generate_keypair();
        let payload = Sample {
            pot_id: "7".to_string(),
            iss: addr,
        };
        let mut envelope = SignedEnvelope::seal_value(&payload, &kp).unwrap();
        // Flip one nibble of the hex payload after signing.
        let mut chars: Vec<char> = envelope.encrypted_payload.chars().collect();
        let idx = chars.len() / 2;
        chars[idx] = if chars[idx] == '0' { '1' } else { '0' };
        envelope.encrypted_payload = chars.into_iter().collect();

        match envelope.open() {
            Ok((_, signer)) => assert_ne!(signer, addr),
            Err(_) => {}
        }
    }

    #[test]
    fn flipped_signature_byte_rejected() {
        let (kp, addr) = generate_keypair();
        let envelope = SignedEnvelope::seal(b"{\"x\":1}", &kp);
        let mut sig = parse_signature(&envelope.signature).unwrap();
        sig[10] ^= 0xff;
        let tampered = SignedEnvelope {
            encrypted_payload: envelope.encrypted_payload,
            signature: format!("0x{}", hex::encode(sig)),
        };
        match tampered.open() {
            Ok((_, signer)) => assert_ne!(signer, addr),
            Err(_) => {}
        }
    }

    #[test]
    fn detached_message_binding() {
        let (kp, addr) = generate_keypair();
        let payload = Sample {
            pot_id: "9".to_string(),
            iss: addr,
        };
        let envelope = SignedEnvelope::seal_with_message(&payload, "12", &kp).unwrap();
        let (_, signer) = envelope.open_with_message("12").unwrap();
        assert_eq!(signer, addr);
        // Bound to "12": verifying against another attempt id must mismatch.
        assert!(
            envelope
                .open_with_message("13")
                .map(|(_, s)| s != addr)
                .unwrap_or(true)
        );
    }
}
