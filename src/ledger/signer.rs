use std::fmt;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const ADDRESS_CONTEXT: &[u8] = b"telemetry-ledger/address: ed25519";
const TRANSACTION_CONTEXT: &[u8] = b"telemetry-ledger/tx: v1";

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid signer key: {0}")]
    InvalidKey(String),

    #[error("failed to sign: {0}")]
    Signing(#[from] ed25519_dalek::SignatureError),
}

/// Account address derived from the signer's public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = Sha256::new()
            .chain_update(ADDRESS_CONTEXT)
            .chain_update(public_key)
            .finalize();

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Ed25519 key of the account that pays for and signs every submission.
#[derive(Clone)]
pub struct AccountSigner {
    key: SigningKey,
}

impl AccountSigner {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    pub fn from_hex(seed: &str) -> Result<Self, SignerError> {
        let raw = hex::decode(seed.trim()).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let seed = <[u8; 32]>::try_from(raw.as_slice()).map_err(|_| {
            SignerError::InvalidKey(format!("expected 32 bytes, got {}", raw.len()))
        })?;

        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    pub fn sign(&self, body: &[u8]) -> Result<[u8; 64], SignerError> {
        let signature = self.key.try_sign(&signing_message(body))?;
        Ok(signature.to_bytes())
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn verify_signature(public_key: &[u8; 32], body: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };

    key.verify(&signing_message(body), &signature).is_ok()
}

fn signing_message(body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(TRANSACTION_CONTEXT.len() + body.len());
    message.extend_from_slice(TRANSACTION_CONTEXT);
    message.extend_from_slice(body);
    message
}
