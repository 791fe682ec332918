use std::{
    collections::BTreeMap,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::sensor::{MeasurementKind, RawReading, ReadingError, SensorId, SensorRegistry};

/// A single fixed-point value at a sensor-supplied timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, i32)", into = "(u64, i32)")]
pub struct MeasurementPoint {
    pub timestamp: u64,
    pub value: i32,
}

impl MeasurementPoint {
    pub fn new(timestamp: u64, value: i32) -> Self {
        Self { timestamp, value }
    }
}

impl From<(u64, i32)> for MeasurementPoint {
    fn from((timestamp, value): (u64, i32)) -> Self {
        Self { timestamp, value }
    }
}

impl From<MeasurementPoint> for (u64, i32) {
    fn from(p: MeasurementPoint) -> Self {
        (p.timestamp, p.value)
    }
}

pub type Measurements = BTreeMap<MeasurementKind, Vec<MeasurementPoint>>;

/// One sensor's share of a batch, submitted as its own transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub sensor_id: SensorId,
    pub measurements: Measurements,
}

impl SubmissionRequest {
    pub fn point_count(&self) -> usize {
        self.measurements.values().map(Vec::len).sum()
    }
}

/// Points accumulated between two flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    sensors: BTreeMap<SensorId, Measurements>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sensor_id: SensorId, kind: MeasurementKind, point: MeasurementPoint) {
        self.sensors
            .entry(sensor_id)
            .or_default()
            .entry(kind)
            .or_default()
            .push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn point_count(&self) -> usize {
        self.sensors
            .values()
            .flat_map(|m| m.values())
            .map(Vec::len)
            .sum()
    }

    pub fn sensor_ids(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.sensors.keys().copied()
    }

    pub fn points(&self, sensor_id: SensorId, kind: MeasurementKind) -> &[MeasurementPoint] {
        self.sensors
            .get(&sensor_id)
            .and_then(|m| m.get(&kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Partitions the batch into one request per sensor.
    pub fn into_requests(self) -> Vec<SubmissionRequest> {
        self.sensors
            .into_iter()
            .map(|(sensor_id, measurements)| SubmissionRequest {
                sensor_id,
                measurements,
            })
            .collect()
    }

    /// Puts `earlier` in front of the points already held, key by key.
    pub fn prepend(&mut self, earlier: PendingBatch) {
        for (sensor_id, measurements) in earlier.sensors {
            let current = self.sensors.entry(sensor_id).or_default();
            for (kind, mut points) in measurements {
                let later = current.entry(kind).or_default();
                points.append(later);
                *later = points;
            }
        }
    }
}

impl FromIterator<SubmissionRequest> for PendingBatch {
    fn from_iter<I: IntoIterator<Item = SubmissionRequest>>(iter: I) -> Self {
        let mut batch = PendingBatch::new();
        for request in iter {
            let measurements = batch.sensors.entry(request.sensor_id).or_default();
            for (kind, mut points) in request.measurements {
                measurements.entry(kind).or_default().append(&mut points);
            }
        }
        batch
    }
}

/// Expands a reading into the points it contributes to a batch.
///
/// Signal strength is always recorded. Temperature is only trusted when the
/// same event carried a pressure value, as both come from one combined sensor.
pub fn derive_points(reading: &RawReading) -> Vec<(MeasurementKind, MeasurementPoint)> {
    let at = |value: i32| MeasurementPoint::new(reading.timestamp, value);

    let mut points = vec![(
        MeasurementKind::SignalStrength,
        at(i32::from(reading.signal_strength)),
    )];

    if reading.pressure > 0 {
        points.push((MeasurementKind::Pressure, at(saturate(reading.pressure))));
        points.push((MeasurementKind::Temperature, at(reading.temperature)));
    }

    if reading.humidity > 0 {
        points.push((MeasurementKind::Humidity, at(saturate(reading.humidity))));
    }

    if reading.gas > 0 {
        points.push((MeasurementKind::Gas, at(i32::from(reading.gas))));
    }

    if reading.illuminance > 0 {
        points.push((MeasurementKind::Illuminance, at(i32::from(reading.illuminance))));
    }

    points
}

fn saturate(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Shared accumulator fed by every connection and drained by the flush driver.
///
/// Appends, swaps and merges all go through one lock, so a swap never sees half
/// of a reading.
#[derive(Debug, Clone)]
pub struct BatchAggregator {
    registry: Arc<SensorRegistry>,
    pending: Arc<Mutex<PendingBatch>>,
}

impl BatchAggregator {
    pub fn new(registry: SensorRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            pending: Arc::new(Mutex::new(PendingBatch::new())),
        }
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Returns the number of points appended.
    pub fn append(&self, reading: &RawReading) -> Result<usize, ReadingError> {
        let Some(sensor_id) = self.registry.get(&reading.name) else {
            return Err(ReadingError::UnknownSensor(reading.name.clone()));
        };

        let points = derive_points(reading);
        let count = points.len();

        let mut pending = self.lock();
        for (kind, point) in points {
            pending.push(sensor_id, kind, point);
        }

        Ok(count)
    }

    pub fn swap_and_clear(&self) -> PendingBatch {
        mem::take(&mut *self.lock())
    }

    /// Returns unsent data to the live batch, ahead of anything appended since
    /// it was swapped out.
    pub fn merge_back(&self, failed: PendingBatch) {
        if failed.is_empty() {
            return;
        }

        self.lock().prepend(failed);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.lock().point_count()
    }

    fn lock(&self) -> MutexGuard<'_, PendingBatch> {
        // Nothing panics while holding the guard, so a poisoned batch is still whole.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
