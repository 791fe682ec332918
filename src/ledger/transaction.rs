use serde::{Deserialize, Serialize};

use crate::ledger::{Fee, verify_signature};

/// Call of a deployed contract instance with a CBOR-encoded [`Request`](crate::ledger::Request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub instance_id: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub call: ContractCall,
    pub fee: Fee,
    pub nonce: u64,
    pub signer: [u8; 32],
}

impl Transaction {
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }
}

/// Encoded transaction body together with the signer's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn from_cbor(raw: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(raw)
    }

    pub fn transaction(&self) -> Result<Transaction, serde_cbor::Error> {
        serde_cbor::from_slice(&self.body)
    }

    /// Decodes the body and checks the signature against the key it names.
    pub fn verify(&self) -> Option<Transaction> {
        let transaction = self.transaction().ok()?;
        verify_signature(&transaction.signer, &self.body, &self.signature).then_some(transaction)
    }
}
