//! Signature verification.
//!
//! Pure function over bytes; no I/O and no retained inputs. The scheme is
//! chosen by configuration so the gateway does not assume the curve.

use sp_core::crypto::{Pair as _, Ss58Codec};
use sp_core::{ed25519, sr25519};
use tracing::warn;

/// Signature scheme of the target chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    Sr25519,
    Ed25519,
}

impl std::str::FromStr for SignatureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sr25519" => Ok(SignatureScheme::Sr25519),
            "ed25519" => Ok(SignatureScheme::Ed25519),
            other => Err(format!("unknown signature scheme: {other}")),
        }
    }
}

/// Scheme-bound verifier capability.
#[derive(Clone, Copy, Debug)]
pub struct Verifier {
    scheme: SignatureScheme,
}

impl Verifier {
    pub fn new(scheme: SignatureScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Verify that `message` was signed by the key behind `hotkey_ss58`.
    ///
    /// Returns false on any malformed input; the caller treats pass/fail
    /// uniformly and never retries.
    pub fn verify(&self, hotkey_ss58: &str, message: &[u8], signature: &[u8]) -> bool {
        if signature.len() != 64 {
            warn!(
                "Invalid signature length: {} (expected 64)",
                signature.len()
            );
            return false;
        }
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(signature);

        match self.scheme {
            SignatureScheme::Sr25519 => {
                let public = match sr25519::Public::from_ss58check(hotkey_ss58) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Invalid hotkey SS58 format: {:?}", e);
                        return false;
                    }
                };
                let signature = sr25519::Signature::from_raw(sig_bytes);
                sr25519::Pair::verify(&signature, message, &public)
            }
            SignatureScheme::Ed25519 => {
                let public = match ed25519::Public::from_ss58check(hotkey_ss58) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Invalid hotkey SS58 format: {:?}", e);
                        return false;
                    }
                };
                let signature = ed25519::Signature::from_raw(sig_bytes);
                ed25519::Pair::verify(&signature, message, &public)
            }
        }
    }

    /// Convenience for hex-encoded signatures as they arrive on the wire.
    pub fn verify_hex(&self, hotkey_ss58: &str, message: &[u8], signature_hex: &str) -> bool {
        match hex::decode(signature_hex.trim_start_matches("0x")) {
            Ok(bytes) => self.verify(hotkey_ss58, message, &bytes),
            Err(e) => {
                warn!("Invalid signature hex: {:?}", e);
                false
            }
        }
    }
}
