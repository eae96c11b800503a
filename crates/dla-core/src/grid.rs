//! Occupancy lattice and the geometry that travels with it.

use crate::history::Snapshot;
use crate::{SimulationError, Site};
use tracing::debug;

/// Square occupancy lattice plus its center and radii.
///
/// Cells are `0` (empty) or `1` (occupied); occupancy is never cleared. The
/// lattice only grows, and growth keeps every occupied site at the same
/// position relative to `center`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    dimension: u32,
    cells: Vec<u8>,
    /// Occupied sites in row-major order.
    occupied: Vec<Site>,
    center: Site,
    populate_radius: i32,
    kill_radius: i32,
    cluster_radius: f64,
}

impl Grid {
    /// Empty lattice of side `2 × populate_radius` centered on its midpoint.
    pub fn new(populate_radius: i32) -> Result<Self, SimulationError> {
        if populate_radius < 0 {
            return Err(SimulationError::InvalidConfiguration(format!(
                "populate radius must be non-negative, got {populate_radius}"
            )));
        }
        let mut grid = Self::with_dimension((populate_radius as u32) * 2);
        grid.populate_radius = populate_radius;
        grid.kill_radius = populate_radius;
        Ok(grid)
    }

    /// Empty lattice of side `dimension`, center `(N / 2, N / 2)`, radii `N / 2`.
    #[must_use]
    pub fn with_dimension(dimension: u32) -> Self {
        let half = (dimension / 2) as i32;
        Self {
            dimension,
            cells: vec![0; (dimension as usize) * (dimension as usize)],
            occupied: Vec::new(),
            center: Site::new(half, half),
            populate_radius: half,
            kill_radius: half,
            cluster_radius: 0.0,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> u32 {
        self.dimension
    }

    #[must_use]
    pub const fn center(&self) -> Site {
        self.center
    }

    #[must_use]
    pub const fn populate_radius(&self) -> i32 {
        self.populate_radius
    }

    #[must_use]
    pub const fn kill_radius(&self) -> i32 {
        self.kill_radius
    }

    #[must_use]
    pub const fn cluster_radius(&self) -> f64 {
        self.cluster_radius
    }

    /// Raw cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Occupied sites in row-major order.
    #[must_use]
    pub fn occupied_sites(&self) -> &[Site] {
        &self.occupied
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.occupied.len()
    }

    #[inline]
    fn index(&self, site: Site) -> Option<usize> {
        let n = self.dimension as i64;
        let (row, col) = (i64::from(site.row), i64::from(site.col));
        if (0..n).contains(&row) && (0..n).contains(&col) {
            Some((row * n + col) as usize)
        } else {
            None
        }
    }

    #[must_use]
    pub fn contains(&self, site: Site) -> bool {
        self.index(site).is_some()
    }

    /// Whether `site` is occupied; sites outside the lattice read as empty.
    #[must_use]
    pub fn is_occupied(&self, site: Site) -> bool {
        self.index(site).is_some_and(|idx| self.cells[idx] == 1)
    }

    /// Marks `site` occupied, returning `false` if it already was.
    ///
    /// # Panics
    /// If `site` lies outside the lattice.
    pub fn occupy(&mut self, site: Site) -> bool {
        let idx = self
            .index(site)
            .unwrap_or_else(|| panic!("site {site} outside lattice of side {}", self.dimension));
        if self.cells[idx] == 1 {
            return false;
        }
        self.cells[idx] = 1;
        let slot = self.occupied.binary_search(&site).unwrap_or_else(|slot| slot);
        self.occupied.insert(slot, site);
        true
    }

    /// True if any cell of the 3×3 block centered on `site` is occupied.
    #[must_use]
    pub fn neighborhood_occupied(&self, site: Site) -> bool {
        (-1..=1).any(|dr| (-1..=1).any(|dc| self.is_occupied(site.offset(dr, dc))))
    }

    /// Sites within two cells of the lattice edge are out of bounds for walkers.
    #[must_use]
    pub fn on_hard_boundary(&self, site: Site) -> bool {
        let n = self.dimension as i64;
        let (row, col) = (i64::from(site.row), i64::from(site.col));
        row <= 1 || row >= n - 2 || col <= 1 || col >= n - 2
    }

    #[must_use]
    pub fn beyond_kill_radius(&self, site: Site) -> bool {
        let kill = i64::from(self.kill_radius);
        site.distance_sq(self.center) > kill * kill
    }

    /// Marks every cell within Euclidean distance `radius` of center.
    pub fn fill_disc(&mut self, radius: i32) -> Result<(), SimulationError> {
        if radius < 0 {
            return Err(SimulationError::InvalidConfiguration(format!(
                "circle radius must be non-negative, got {radius}"
            )));
        }
        let corners = [
            self.center.offset(-radius, -radius),
            self.center.offset(radius, radius),
        ];
        if corners.iter().any(|corner| !self.contains(*corner)) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "circle radius {radius} does not fit a lattice of side {}",
                self.dimension
            )));
        }
        let limit = i64::from(radius) * i64::from(radius);
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                let site = self.center.offset(dr, dc);
                if site.distance_sq(self.center) <= limit {
                    self.occupy(site);
                }
            }
        }
        Ok(())
    }

    /// Recomputes the cluster radius and lets the populate/kill radii follow it.
    ///
    /// `populate_radius` never shrinks; `kill_radius` always equals it.
    pub fn refresh_radii(&mut self, multiplier: f64) -> f64 {
        self.cluster_radius = self
            .occupied
            .iter()
            .map(|site| site.distance(self.center))
            .fold(0.0, f64::max);
        let grown = (self.cluster_radius * multiplier).floor() as i32;
        self.populate_radius = self.populate_radius.max(grown);
        self.kill_radius = self.populate_radius;
        self.cluster_radius
    }

    /// Grows the lattice to `2 × populate_radius` if it is smaller.
    ///
    /// The old lattice lands in the centered sub-block of the new one and
    /// `center` shifts by the same offset. Returns whether growth happened.
    pub fn expand_if_needed(&mut self, max_dimension: u32) -> Result<bool, SimulationError> {
        let target = i64::from(self.populate_radius) * 2;
        if target <= i64::from(self.dimension) {
            return Ok(false);
        }
        if target > i64::from(max_dimension) {
            return Err(SimulationError::ResourceExhausted(format!(
                "lattice growth to {target} exceeds max dimension {max_dimension}"
            )));
        }
        let target = target as u32;
        let offset = ((target - self.dimension) / 2) as i32;
        let old_n = self.dimension as usize;
        let new_n = target as usize;

        let mut cells = vec![0u8; new_n * new_n];
        for row in 0..old_n {
            let src = row * old_n;
            let dst = (row + offset as usize) * new_n + offset as usize;
            cells[dst..dst + old_n].copy_from_slice(&self.cells[src..src + old_n]);
        }
        for site in &mut self.occupied {
            *site = site.offset(offset, offset);
        }

        debug!(
            from = self.dimension,
            to = target,
            offset,
            "expanded lattice"
        );
        self.cells = cells;
        self.dimension = target;
        self.center = self.center.offset(offset, offset);
        Ok(true)
    }

    /// Copies the occupied set and current side length.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.occupied.clone(), self.dimension)
    }
}
