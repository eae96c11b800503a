//! Read-only summaries of a saved history store.

use std::fmt;

use dla_core::{History, HistoryError};
use serde::Serialize;

/// Overview of a history store, optionally with one looked-up record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistorySummary {
    pub records: usize,
    pub first_key: Option<u64>,
    pub last_key: Option<u64>,
    /// Largest lattice side length across all records.
    pub max_dimension: Option<u32>,
    pub final_particles: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<RecordSummary>,
}

/// A floor-matched record: the greatest stored key `<= requested`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RecordSummary {
    pub requested: u64,
    pub key: u64,
    pub dimension: u32,
    pub particles: usize,
}

/// Summarizes `history`, looking up the record at or below `at` when given.
pub fn summarize(history: &History, at: Option<u64>) -> Result<HistorySummary, HistoryError> {
    let at = at
        .map(|requested| {
            history
                .lookup(requested)
                .map(|(key, snapshot)| RecordSummary {
                    requested,
                    key,
                    dimension: snapshot.dimension(),
                    particles: snapshot.particle_count(),
                })
        })
        .transpose()?;

    Ok(HistorySummary {
        records: history.len(),
        first_key: history.first_key(),
        last_key: history.last_key(),
        max_dimension: history.max_dimension(),
        final_particles: history
            .latest()
            .map(|(_, snapshot)| snapshot.particle_count()),
        at,
    })
}

fn or_dash<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records        {}", self.records)?;
        writeln!(
            f,
            "keys           {} ..= {}",
            or_dash(self.first_key),
            or_dash(self.last_key)
        )?;
        writeln!(f, "canvas size    {}", or_dash(self.max_dimension))?;
        write!(f, "final count    {}", or_dash(self.final_particles))?;
        if let Some(record) = self.at {
            write!(
                f,
                "\nat {:<12} key {}, dimension {}, particles {}",
                record.requested, record.key, record.dimension, record.particles
            )?;
        }
        Ok(())
    }
}
