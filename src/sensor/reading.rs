use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
}

/// One line of sensor telemetry.
///
/// Optional quantities use zero as "not measured", so a genuine zero reading
/// cannot be told apart from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReading {
    pub name: String,

    /// UNIX seconds, as reported by the sensor.
    pub timestamp: u64,

    /// dBm.
    #[serde(rename = "rssi")]
    pub signal_strength: i8,

    /// Hundredths of a degree Celsius.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub temperature: i32,

    /// Thousandths of a hectopascal.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pressure: u32,

    /// Thousandths of a percent relative humidity.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub humidity: u32,

    /// ppm.
    #[serde(rename = "co2", default, skip_serializing_if = "is_zero")]
    pub gas: u16,

    /// lux.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub illuminance: u16,
}

fn is_zero<T: Default + PartialEq>(v: &T) -> bool {
    *v == T::default()
}

impl RawReading {
    pub fn decode(line: &str) -> Result<Self, ReadingError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ReadingError::MalformedInput("empty line".to_string()));
        }

        let reading: RawReading = serde_json::from_str(line)
            .map_err(|e| ReadingError::MalformedInput(e.to_string()))?;

        reading.validate()?;

        Ok(reading)
    }

    pub fn encode(&self) -> Result<String, ReadingError> {
        self.validate()?;

        let mut line = serde_json::to_string(self)
            .map_err(|e| ReadingError::MalformedInput(e.to_string()))?;
        line.push('\n');

        Ok(line)
    }

    pub fn measured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.timestamp).ok()?, 0)
    }

    fn validate(&self) -> Result<(), ReadingError> {
        if self.name.trim().is_empty() {
            return Err(ReadingError::MalformedInput(
                "sensor name is empty".to_string(),
            ));
        }

        // Points are stored as i32.
        if i32::try_from(self.pressure).is_err() {
            return Err(ReadingError::MalformedInput(format!(
                "pressure out of range: {}",
                self.pressure
            )));
        }
        if i32::try_from(self.humidity).is_err() {
            return Err(ReadingError::MalformedInput(format!(
                "humidity out of range: {}",
                self.humidity
            )));
        }

        Ok(())
    }
}
