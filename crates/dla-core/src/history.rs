//! Append-only record of cluster snapshots keyed by launch count.

use crate::grid::Grid;
use crate::{MAX_LATTICE_DIMENSION, Site};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use thiserror::Error;

/// Errors raised by history lookups and decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// No record at or below the requested key.
    #[error("no snapshot recorded at or before launch {key}")]
    NotFound { key: u64 },
    #[error("history contains no snapshots")]
    Empty,
    /// Malformed or truncated persistence stream.
    #[error("failed to decode history: {0}")]
    Deserialization(String),
}

/// Occupied sites of the cluster together with the lattice side length at the time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    sites: Vec<Site>,
    dimension: u32,
}

impl Snapshot {
    #[must_use]
    pub fn new(sites: Vec<Site>, dimension: u32) -> Self {
        Self { sites, dimension }
    }

    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    #[must_use]
    pub const fn dimension(&self) -> u32 {
        self.dimension
    }

    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.sites.len()
    }

    /// True if every site lies inside the recorded dimension.
    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        let n = i64::from(self.dimension);
        self.sites.iter().all(|site| {
            (0..n).contains(&i64::from(site.row)) && (0..n).contains(&i64::from(site.col))
        })
    }

    /// Rebuilds a lattice from this snapshot.
    ///
    /// The center is recomputed as `(N / 2, N / 2)`, which need not match the
    /// center that was active when the snapshot was taken.
    pub fn restore(&self) -> Result<Grid, HistoryError> {
        if self.dimension > MAX_LATTICE_DIMENSION {
            return Err(HistoryError::Deserialization(format!(
                "snapshot dimension {} exceeds the lattice limit {MAX_LATTICE_DIMENSION}",
                self.dimension
            )));
        }
        if !self.is_within_bounds() {
            return Err(HistoryError::Deserialization(format!(
                "snapshot holds sites outside its dimension {}",
                self.dimension
            )));
        }
        let mut grid = Grid::with_dimension(self.dimension);
        for site in &self.sites {
            grid.occupy(*site);
        }
        Ok(grid)
    }
}

/// Key-ordered snapshot log. Keys are strictly increasing and never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    records: BTreeMap<u64, Snapshot>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn first_key(&self) -> Option<u64> {
        self.records.keys().next().copied()
    }

    #[must_use]
    pub fn last_key(&self) -> Option<u64> {
        self.records.keys().next_back().copied()
    }

    /// Highest-keyed record.
    #[must_use]
    pub fn latest(&self) -> Option<(u64, &Snapshot)> {
        self.records.iter().next_back().map(|(key, snap)| (*key, snap))
    }

    /// Largest lattice side length across all records.
    #[must_use]
    pub fn max_dimension(&self) -> Option<u32> {
        self.records.values().map(Snapshot::dimension).max()
    }

    /// Records in ascending key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, &Snapshot)> + '_ {
        self.records.iter().map(|(key, snap)| (*key, snap))
    }

    /// Appends a record.
    ///
    /// # Panics
    /// If `key` is not strictly greater than the last stored key.
    pub fn append(&mut self, key: u64, snapshot: Snapshot) {
        if let Some(last) = self.last_key() {
            assert!(
                key > last,
                "history key {key} must exceed last recorded key {last}"
            );
        }
        debug_assert!(snapshot.is_within_bounds());
        self.records.insert(key, snapshot);
    }

    /// Exact match for `key`, else the greatest key strictly below it.
    pub fn lookup(&self, key: u64) -> Result<(u64, &Snapshot), HistoryError> {
        self.records
            .range((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(found, snap)| (*found, snap))
            .ok_or(HistoryError::NotFound { key })
    }

    /// Rebuilds the lattice of the record matched by [`History::lookup`].
    pub fn restore(&self, key: u64) -> Result<(u64, Grid), HistoryError> {
        let (found, snapshot) = self.lookup(key)?;
        Ok((found, snapshot.restore()?))
    }

    /// Encodes the whole store; see [`crate::codec`].
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        crate::codec::encode(self)
    }

    /// Decodes a whole store, failing without partial results.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, HistoryError> {
        crate::codec::decode(bytes)
    }

    pub(crate) fn from_sorted(records: BTreeMap<u64, Snapshot>) -> Self {
        Self { records }
    }
}
