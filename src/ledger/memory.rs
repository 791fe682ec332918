use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{
    batch::MeasurementPoint,
    ledger::{
        Address, Aggregate, Ledger, LedgerError, Request, Response, SignedTransaction, Transaction,
    },
    sensor::{MeasurementKind, SensorDescriptor, SensorId},
};

/// Ledger kept in process memory, running the measurement contract locally.
///
/// Checks signatures and nonces the way the real ledger does. Used for dry
/// runs and as a test double; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    nonces: HashMap<Address, u64>,
    sensors: BTreeMap<SensorId, SensorDescriptor>,
    measurements: BTreeMap<(SensorId, MeasurementKind), Vec<MeasurementPoint>>,
    committed: Vec<Transaction>,
    rejected_sensors: HashSet<SensorId>,
    unreachable: bool,
    commit_delay: Option<Duration>,
    reply_override: Option<Vec<u8>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sensor directly, bypassing the contract call.
    pub fn register(&self, name: &str) -> SensorId {
        let sensor_id = derive_sensor_id(name);
        self.lock().sensors.insert(
            sensor_id,
            SensorDescriptor {
                name: name.to_string(),
                measurement_kinds: MeasurementKind::ALL.to_vec(),
                storage_granularity: 600,
                query_granularity: 3600,
            },
        );
        sensor_id
    }

    /// Makes the contract refuse measurements for `sensor_id` until [`accept_sensor`](Self::accept_sensor).
    pub fn reject_sensor(&self, sensor_id: SensorId) {
        self.lock().rejected_sensors.insert(sensor_id);
    }

    pub fn accept_sensor(&self, sensor_id: SensorId) {
        self.lock().rejected_sensors.remove(&sensor_id);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        self.lock().commit_delay = delay;
    }

    /// Answers every successful commit with `raw` instead of the contract reply.
    pub fn set_reply_override(&self, raw: Option<Vec<u8>>) {
        self.lock().reply_override = raw;
    }

    pub fn committed(&self) -> Vec<Transaction> {
        self.lock().committed.clone()
    }

    pub fn measurements(&self, sensor_id: SensorId, kind: MeasurementKind) -> Vec<MeasurementPoint> {
        self.lock()
            .measurements
            .get(&(sensor_id, kind))
            .cloned()
            .unwrap_or_default()
    }

    pub fn sensors(&self) -> BTreeMap<SensorId, SensorDescriptor> {
        self.lock().sensors.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Ledger for MemoryLedger {
    async fn fetch_sequence_number(&self, address: &Address) -> Result<u64, LedgerError> {
        let state = self.lock();
        if state.unreachable {
            return Err(LedgerError::Unreachable("memory ledger offline".to_string()));
        }

        Ok(state.nonces.get(address).copied().unwrap_or(0))
    }

    async fn commit(&self, transaction: &SignedTransaction) -> Result<Vec<u8>, LedgerError> {
        let delay = self.lock().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.unreachable {
            return Err(LedgerError::Unreachable("memory ledger offline".to_string()));
        }

        let tx = transaction
            .verify()
            .ok_or_else(|| LedgerError::Rejected("invalid signature".to_string()))?;

        let address = Address::from_public_key(&tx.signer);
        let expected = state.nonces.get(&address).copied().unwrap_or(0);
        if tx.nonce != expected {
            return Err(LedgerError::Rejected(format!(
                "sequence conflict: expected nonce {expected}, got {}",
                tx.nonce
            )));
        }

        let request = Request::from_cbor(&tx.call.data)
            .map_err(|e| LedgerError::Rejected(format!("bad request: {e}")))?;
        let response = state.execute(request)?;

        *state.nonces.entry(address).or_default() += 1;
        state.committed.push(tx);

        if let Some(raw) = &state.reply_override {
            return Ok(raw.clone());
        }

        response
            .to_cbor()
            .map_err(|e| LedgerError::Rejected(format!("bad response: {e}")))
    }
}

impl State {
    fn execute(&mut self, request: Request) -> Result<Response, LedgerError> {
        match request {
            Request::RegisterSensor { sensor } => {
                let sensor_id = derive_sensor_id(&sensor.name);
                info!(%sensor_id, name = %sensor.name, "memory ledger registered sensor");
                self.sensors.insert(sensor_id, sensor);
                Ok(Response::RegisterSensor { sensor_id })
            }
            Request::GetSensorsByName { sensor_names } => {
                let sensors = self
                    .sensors
                    .iter()
                    .filter(|(_, s)| sensor_names.contains(&s.name))
                    .map(|(id, s)| (*id, s.clone()))
                    .collect();
                Ok(Response::GetSensorsByName { sensors })
            }
            Request::SubmitMeasurements {
                sensor_id,
                measurements,
            } => {
                if !self.sensors.contains_key(&sensor_id) {
                    return Err(LedgerError::Rejected(format!("unknown sensor {sensor_id}")));
                }
                if self.rejected_sensors.contains(&sensor_id) {
                    return Err(LedgerError::Rejected(format!(
                        "contract refused measurements for {sensor_id}"
                    )));
                }

                for (kind, points) in measurements {
                    debug!(%sensor_id, %kind, points = points.len(), "memory ledger stored measurements");
                    self.measurements
                        .entry((sensor_id, kind))
                        .or_default()
                        .extend(points);
                }
                Ok(Response::Empty)
            }
            Request::Query {
                sensor_id,
                measurement_kind,
                aggregate,
                start,
                end,
            } => {
                let values: Vec<i64> = self
                    .measurements
                    .get(&(sensor_id, measurement_kind))
                    .into_iter()
                    .flatten()
                    .filter(|p| (start..=end).contains(&p.timestamp))
                    .map(|p| i64::from(p.value))
                    .collect();

                if values.is_empty() {
                    return Ok(Response::Empty);
                }

                let value = match aggregate {
                    Aggregate::Min => values.iter().copied().min().unwrap_or_default(),
                    Aggregate::Max => values.iter().copied().max().unwrap_or_default(),
                    Aggregate::Avg => values.iter().sum::<i64>() / values.len() as i64,
                };

                Ok(Response::Query {
                    value: value as i32,
                })
            }
        }
    }
}

fn derive_sensor_id(name: &str) -> SensorId {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    SensorId::from_bytes(bytes)
}
