use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{Error, bail};
use serde::{Deserialize, Serialize};

use crate::{
    batch::{Measurements, SubmissionRequest},
    sensor::{MeasurementKind, SensorDescriptor, SensorId},
};

/// Raw reply the contract sends when a call has no result value: the CBOR
/// text string `"empty"`.
pub const EMPTY_RESPONSE_RAW: &[u8] = b"\x65empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Min,
    Max,
    Avg,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Avg => "avg",
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "avg" => Ok(Aggregate::Avg),
            _ => bail!("unknown aggregate: {}", s),
        }
    }
}

/// Contract call payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    RegisterSensor {
        sensor: SensorDescriptor,
    },
    GetSensorsByName {
        sensor_names: Vec<String>,
    },
    SubmitMeasurements {
        sensor_id: SensorId,
        measurements: Measurements,
    },
    Query {
        sensor_id: SensorId,
        measurement_kind: MeasurementKind,
        aggregate: Aggregate,
        start: u64,
        end: u64,
    },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::RegisterSensor { .. } => "register_sensor",
            Request::GetSensorsByName { .. } => "get_sensors_by_name",
            Request::SubmitMeasurements { .. } => "submit_measurements",
            Request::Query { .. } => "query",
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn from_cbor(raw: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(raw)
    }

    /// Whether `response` has the shape this call can produce. `Empty` is
    /// accepted for every call.
    pub fn expects(&self, response: &Response) -> bool {
        matches!(
            (self, response),
            (_, Response::Empty)
                | (Request::RegisterSensor { .. }, Response::RegisterSensor { .. })
                | (Request::GetSensorsByName { .. }, Response::GetSensorsByName { .. })
                | (Request::Query { .. }, Response::Query { .. })
        )
    }
}

impl From<SubmissionRequest> for Request {
    fn from(request: SubmissionRequest) -> Self {
        Request::SubmitMeasurements {
            sensor_id: request.sensor_id,
            measurements: request.measurements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    RegisterSensor {
        sensor_id: SensorId,
    },
    GetSensorsByName {
        sensors: BTreeMap<SensorId, SensorDescriptor>,
    },
    Query {
        value: i32,
    },
    Empty,
}

impl Response {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_cbor::Error> {
        if raw == EMPTY_RESPONSE_RAW {
            return Ok(Response::Empty);
        }

        serde_cbor::from_slice(raw)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }
}
