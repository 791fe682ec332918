use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum MeasurementKind {
    Temperature,
    Humidity,
    Gas,
    Pressure,
    Illuminance,
    SignalStrength,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 6] = [
        MeasurementKind::Temperature,
        MeasurementKind::Humidity,
        MeasurementKind::Gas,
        MeasurementKind::Pressure,
        MeasurementKind::Illuminance,
        MeasurementKind::SignalStrength,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Temperature => "temperature",
            MeasurementKind::Humidity => "humidity",
            MeasurementKind::Gas => "gas",
            MeasurementKind::Pressure => "pressure",
            MeasurementKind::Illuminance => "illuminance",
            MeasurementKind::SignalStrength => "signal_strength",
        }
    }

    /// Numeric tag understood by the ledger contract.
    pub fn code(&self) -> u16 {
        match self {
            MeasurementKind::Temperature => 1,
            MeasurementKind::Humidity => 2,
            MeasurementKind::Gas => 3,
            MeasurementKind::Pressure => 4,
            MeasurementKind::Illuminance => 5,
            MeasurementKind::SignalStrength => 6,
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(MeasurementKind::Temperature),
            "humidity" => Ok(MeasurementKind::Humidity),
            "gas" | "co2" => Ok(MeasurementKind::Gas),
            "pressure" => Ok(MeasurementKind::Pressure),
            "illuminance" => Ok(MeasurementKind::Illuminance),
            "signal_strength" | "rssi" => Ok(MeasurementKind::SignalStrength),
            _ => bail!("unknown measurement kind: {}", s),
        }
    }
}

impl TryFrom<u16> for MeasurementKind {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(MeasurementKind::Temperature),
            2 => Ok(MeasurementKind::Humidity),
            3 => Ok(MeasurementKind::Gas),
            4 => Ok(MeasurementKind::Pressure),
            5 => Ok(MeasurementKind::Illuminance),
            6 => Ok(MeasurementKind::SignalStrength),
            _ => bail!("unknown measurement kind code: {v}"),
        }
    }
}

impl From<MeasurementKind> for u16 {
    fn from(kind: MeasurementKind) -> Self {
        kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_codes_agree() {
        for kind in MeasurementKind::ALL {
            assert_eq!(kind.as_str().parse::<MeasurementKind>().unwrap(), kind);
            assert_eq!(MeasurementKind::try_from(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("co2".parse::<MeasurementKind>().unwrap(), MeasurementKind::Gas);
        assert_eq!(
            "rssi".parse::<MeasurementKind>().unwrap(),
            MeasurementKind::SignalStrength
        );
        assert!("voltage".parse::<MeasurementKind>().is_err());
        assert!(MeasurementKind::try_from(0).is_err());
    }
}
