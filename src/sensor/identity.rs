use std::fmt;
use std::str::FromStr;

use anyhow::{Context as _, Error, bail};
use serde::{Deserialize, Serialize};

/// Ledger-assigned sensor identifier.
///
/// Carried on the wire as a big-endian `u64`, which is how the contract keys
/// its sensor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct SensorId([u8; 8]);

impl SensorId {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<u64> for SensorId {
    fn from(v: u64) -> Self {
        Self(v.to_be_bytes())
    }
}

impl From<SensorId> for u64 {
    fn from(id: SensorId) -> Self {
        u64::from_be_bytes(id.0)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SensorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).with_context(|| format!("invalid sensor id: {s}"))?;
        let Ok(bytes) = <[u8; 8]>::try_from(raw.as_slice()) else {
            bail!("invalid sensor id length: expected 8 bytes, got {}", raw.len());
        };

        Ok(Self(bytes))
    }
}

/// Registration record of a sensor, as stored by the ledger contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub name: String,

    pub measurement_kinds: Vec<crate::sensor::MeasurementKind>,

    /// Expected interval between submissions, in seconds.
    pub storage_granularity: u64,

    /// Smallest window the contract will aggregate over, in seconds.
    pub query_granularity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_id_hex_round_trip() {
        let id = SensorId::from(0x0102_0304_0506_0708);
        assert_eq!(id.to_string(), "0102030405060708");
        assert_eq!("0102030405060708".parse::<SensorId>().unwrap(), id);
    }

    #[test]
    fn test_sensor_id_rejects_wrong_length() {
        assert!("0102".parse::<SensorId>().is_err());
        assert!("zz02030405060708".parse::<SensorId>().is_err());
    }

    #[test]
    fn test_sensor_id_is_big_endian_u64() {
        let id = SensorId::from_bytes([0, 0, 0, 0, 0, 0, 1, 0]);
        assert_eq!(u64::from(id), 256);
    }
}
