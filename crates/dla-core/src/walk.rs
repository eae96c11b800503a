//! Single-particle random walk on a read-only lattice.

use crate::grid::Grid;
use crate::random::RandomSource;
use crate::{SimulationError, Site};
use serde::{Deserialize, Serialize};

/// Unit steps as `(d_row, d_col)`: four axis moves then four diagonals.
pub const DIRECTIONS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

/// Terminal state of a walk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalkOutcome {
    pub final_position: Site,
    /// `true` if the walker left the lattice or the kill radius.
    pub lost: bool,
}

/// Step budget for one walk under the current kill radius.
#[must_use]
pub fn step_limit(grid: &Grid, step_factor: u64) -> u64 {
    let reach = u64::from(grid.kill_radius().unsigned_abs()) + 1;
    step_factor.saturating_mul(reach.saturating_mul(reach))
}

/// Walks from `start` until the particle is lost or touches the cluster.
///
/// After every step the checks run in order: hard lattice boundary, kill
/// radius, then the 3×3 occupancy block. The start position itself is never
/// tested.
pub fn walk<R: RandomSource + ?Sized>(
    grid: &Grid,
    start: Site,
    source: &mut R,
    max_steps: u64,
) -> Result<WalkOutcome, SimulationError> {
    let mut position = start;
    for _ in 0..max_steps {
        let (d_row, d_col) = DIRECTIONS[source.direction()];
        position = position.offset(d_row, d_col);

        if grid.on_hard_boundary(position) || grid.beyond_kill_radius(position) {
            return Ok(WalkOutcome {
                final_position: position,
                lost: true,
            });
        }
        if grid.neighborhood_occupied(position) {
            return Ok(WalkOutcome {
                final_position: position,
                lost: false,
            });
        }
    }
    Err(SimulationError::ResourceExhausted(format!(
        "walk from {start} did not terminate within {max_steps} steps"
    )))
}
