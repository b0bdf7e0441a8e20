use serde::Serialize;

use crate::{
    alias::MetricAlias,
    instrument::{Instrument, InstrumentSnapshot},
};

/// Values of every instrument at one point in time, ordered by alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    entries: Vec<(MetricAlias, InstrumentSnapshot)>,
}

impl RegistrySnapshot {
    pub(crate) fn capture(mut handles: Vec<(MetricAlias, Instrument)>) -> Self {
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            entries: handles
                .into_iter()
                .map(|(alias, instrument)| {
                    let snapshot = instrument.snapshot();
                    (alias, snapshot)
                })
                .collect(),
        }
    }

    pub fn get(&self, alias: &MetricAlias) -> Option<&InstrumentSnapshot> {
        self.entries
            .binary_search_by(|(a, _)| a.cmp(alias))
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (MetricAlias, InstrumentSnapshot)> {
        self.entries.iter()
    }

    /// Every `(alias, field, value)` triple, in alias order.
    pub fn flatten(&self) -> Vec<(&MetricAlias, &'static str, f64)> {
        self.entries
            .iter()
            .flat_map(|(alias, snapshot)| {
                snapshot
                    .fields()
                    .into_iter()
                    .map(move |(field, value)| (alias, field, value))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a RegistrySnapshot {
    type Item = &'a (MetricAlias, InstrumentSnapshot);
    type IntoIter = std::slice::Iter<'a, (MetricAlias, InstrumentSnapshot)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
