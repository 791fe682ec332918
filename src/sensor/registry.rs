use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::sensor::{SensorDescriptor, SensorId};

/// Name to id mapping of the sensors known to the ledger.
///
/// Built once at startup and shared read-only by every connection.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    by_name: IndexMap<String, SensorId>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from a `get_sensors_by_name` reply.
    pub fn from_lookup(sensors: &BTreeMap<SensorId, SensorDescriptor>) -> Self {
        sensors
            .iter()
            .map(|(id, descriptor)| (descriptor.name.clone(), *id))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<SensorId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SensorId)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

impl FromIterator<(String, SensorId)> for SensorRegistry {
    fn from_iter<I: IntoIterator<Item = (String, SensorId)>>(iter: I) -> Self {
        Self {
            by_name: iter.into_iter().collect(),
        }
    }
}
