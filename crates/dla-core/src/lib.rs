//! Core engine for generalized diffusion-limited aggregation on a square lattice.
//!
//! A [`Simulation`] owns the lattice, its geometry, the launch counters and the
//! append-only [`History`] of accepted snapshots. Callers drive it one launch at
//! a time via [`Simulation::simulate_one_particle`].

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod codec;
pub mod engine;
pub mod grid;
pub mod history;
pub mod params;
pub mod random;
pub mod walk;

pub use engine::{Counters, LaunchOutcome, Simulation};
pub use grid::Grid;
pub use history::{History, HistoryError, Snapshot};
pub use params::{Eta, Regime, Seed, SeedKind};
pub use random::RandomSource;
pub use walk::{DIRECTIONS, WalkOutcome, walk};

/// Largest lattice side length any simulation or decoded record may use.
pub const MAX_LATTICE_DIMENSION: u32 = 16_384;

/// Errors raised while configuring or advancing a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Unknown seed kind, negative counts/radii, or an unsupported `(n, m)` pair.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Lattice growth or a single walk exceeded its safety bound.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Lattice coordinate as `(row, col)`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Site {
    pub row: i32,
    pub col: i32,
}

impl Site {
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Returns this site moved by `(d_row, d_col)`.
    #[must_use]
    pub const fn offset(self, d_row: i32, d_col: i32) -> Self {
        Self {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Site) -> i64 {
        let dr = i64::from(self.row) - i64::from(other.row);
        let dc = i64::from(self.col) - i64::from(other.col);
        dr * dr + dc * dc
    }

    #[must_use]
    pub fn distance(self, other: Site) -> f64 {
        (self.distance_sq(other) as f64).sqrt()
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Static configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Populate/kill radius at start; the lattice begins at twice this side length.
    pub initial_populate_radius: i32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Accepted particles between cluster-radius refreshes.
    pub maintenance_interval: u64,
    /// Populate radius tracks `radius_multiplier × cluster_radius` once it outgrows the current one.
    pub radius_multiplier: f64,
    /// A single walk may take at most `walk_step_factor × (kill_radius + 1)²` steps.
    pub walk_step_factor: u64,
    /// Largest lattice side length the engine will allocate, at most [`MAX_LATTICE_DIMENSION`].
    pub max_dimension: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_populate_radius: 50,
            rng_seed: None,
            maintenance_interval: 10,
            radius_multiplier: 3.0,
            walk_step_factor: 1_000,
            max_dimension: MAX_LATTICE_DIMENSION,
        }
    }
}

impl SimulationConfig {
    /// Validates the configuration before any lattice is allocated.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.initial_populate_radius < 3 {
            return Err(SimulationError::InvalidConfiguration(
                "initial_populate_radius must be at least 3".into(),
            ));
        }
        if self.maintenance_interval == 0 {
            return Err(SimulationError::InvalidConfiguration(
                "maintenance_interval must be non-zero".into(),
            ));
        }
        if !self.radius_multiplier.is_finite() || self.radius_multiplier < 1.0 {
            return Err(SimulationError::InvalidConfiguration(
                "radius_multiplier must be finite and at least 1".into(),
            ));
        }
        if self.walk_step_factor == 0 {
            return Err(SimulationError::InvalidConfiguration(
                "walk_step_factor must be non-zero".into(),
            ));
        }
        if self.max_dimension > MAX_LATTICE_DIMENSION {
            return Err(SimulationError::InvalidConfiguration(format!(
                "max_dimension {} exceeds the lattice limit {MAX_LATTICE_DIMENSION}",
                self.max_dimension
            )));
        }
        if i64::from(self.initial_populate_radius) * 2 > i64::from(self.max_dimension) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "initial lattice of {} exceeds max_dimension {}",
                i64::from(self.initial_populate_radius) * 2,
                self.max_dimension
            )));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
