use serde::{Deserialize, Serialize};

use crate::ledger::Request;

/// Gas charged for any contract call.
pub const BASE_GAS: u64 = 350_000;

/// Encoded request size covered by [`BASE_GAS`].
pub const BASE_GAS_BYTES: u64 = 130;

pub const GAS_PER_EXTRA_BYTE: u64 = 2_700;

/// Native base units paid per unit of gas.
pub const GAS_PRICE: u64 = 100;

pub fn gas_limit_for_len(len: usize) -> u64 {
    let len = len as u64;
    if len <= BASE_GAS_BYTES {
        return BASE_GAS;
    }

    BASE_GAS.saturating_add((len - BASE_GAS_BYTES).saturating_mul(GAS_PER_EXTRA_BYTE))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub gas: u64,
    pub amount: u64,
}

impl Fee {
    pub fn for_encoded_len(len: usize) -> Self {
        let gas = gas_limit_for_len(len);
        Self {
            gas,
            amount: gas.saturating_mul(GAS_PRICE),
        }
    }

    pub fn for_request(request: &Request) -> Result<Self, serde_cbor::Error> {
        Ok(Self::for_encoded_len(request.to_cbor()?.len()))
    }
}
