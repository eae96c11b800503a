//! Launch orchestration: candidate search, ETA acceptance, and periodic growth.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::grid::Grid;
use crate::history::{History, HistoryError, Snapshot};
use crate::params::{Eta, Regime, Seed};
use crate::random::RandomSource;
use crate::walk::{step_limit, walk};
use crate::{SimulationConfig, SimulationError, Site};

/// Monotonic launch bookkeeping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counters {
    /// Every candidate walk attempt.
    pub launch_count: u64,
    pub attached_particles: u64,
    /// Lost candidate walks plus rejected candidates.
    pub lost_particles: u64,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Launched: {}, Attached: {}, Lost: {}",
            self.launch_count, self.attached_particles, self.lost_particles
        )
    }
}

/// A record can seed a live lattice only if it fits the configured bound and
/// has a cluster for walkers to reach.
fn check_restorable(
    config: &SimulationConfig,
    key: u64,
    snapshot: &Snapshot,
) -> Result<(), SimulationError> {
    if snapshot.dimension() > config.max_dimension {
        return Err(SimulationError::ResourceExhausted(format!(
            "record {key} lattice {} exceeds max dimension {}",
            snapshot.dimension(),
            config.max_dimension
        )));
    }
    if snapshot.sites().is_empty() {
        return Err(SimulationError::InvalidConfiguration(format!(
            "record {key} holds no occupied sites"
        )));
    }
    Ok(())
}

fn bump(counter: &mut u64, name: &str) {
    *counter = counter
        .checked_add(1)
        .unwrap_or_else(|| panic!("{name} counter overflowed"));
}

/// Result of one launch cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The candidate became part of the cluster; `key` is its history key.
    Accepted { site: Site, key: u64 },
    /// The candidate failed the ETA test; the lattice is unchanged.
    Rejected { site: Site },
}

impl LaunchOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, LaunchOutcome::Accepted { .. })
    }

    #[must_use]
    pub const fn site(&self) -> Site {
        match *self {
            LaunchOutcome::Accepted { site, .. } | LaunchOutcome::Rejected { site } => site,
        }
    }
}

/// Exclusive owner of the lattice, its geometry, counters and history.
pub struct Simulation<R = SmallRng> {
    config: SimulationConfig,
    grid: Grid,
    history: History,
    counters: Counters,
    source: R,
    seeded: bool,
    eta: Option<Eta>,
}

impl<R> fmt::Debug for Simulation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("dimension", &self.grid.dimension())
            .field("center", &self.grid.center())
            .field("populate_radius", &self.grid.populate_radius())
            .field("counters", &self.counters)
            .field("records", &self.history.len())
            .field("eta", &self.eta)
            .finish()
    }
}

impl Simulation<SmallRng> {
    /// Unseeded simulation driven by the configuration's RNG.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let rng = config.seeded_rng();
        Self::with_source(config, rng)
    }
}

impl<R: RandomSource> Simulation<R> {
    /// Unseeded simulation driven by `source`.
    pub fn with_source(config: SimulationConfig, source: R) -> Result<Self, SimulationError> {
        config.validate()?;
        let grid = Grid::new(config.initial_populate_radius)?;
        Ok(Self {
            config,
            grid,
            history: History::new(),
            counters: Counters::default(),
            source,
            seeded: false,
            eta: None,
        })
    }

    /// Rebuilds a simulation from the latest record of `history`.
    ///
    /// The lattice comes from [`Snapshot::restore`], `launch_count` is the
    /// latest key and `attached_particles` the record count. Lost particles
    /// are whatever launches remain. One maintenance pass then brings the
    /// radii in line with the restored cluster. A latest record with no sites
    /// is `InvalidConfiguration`, since no walker could ever attach to it.
    pub fn resume(
        config: SimulationConfig,
        history: History,
        source: R,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let (key, snapshot) = history.latest().ok_or(HistoryError::Empty)?;
        check_restorable(&config, key, snapshot)?;
        let grid = snapshot.restore()?;
        let attached = history.len() as u64;
        let lost = key.checked_sub(attached).ok_or_else(|| {
            SimulationError::InvalidConfiguration(format!(
                "latest key {key} is smaller than the {attached} recorded attachments"
            ))
        })?;

        let mut sim = Self {
            config,
            grid,
            history,
            counters: Counters {
                launch_count: key,
                attached_particles: attached,
                lost_particles: lost,
            },
            source,
            seeded: true,
            eta: None,
        };
        sim.maintain()?;
        info!(
            key,
            attached,
            dimension = sim.grid.dimension(),
            "resumed simulation from checkpoint"
        );
        Ok(sim)
    }

    /// Places the initial cluster. Valid exactly once per simulation.
    pub fn initialize(&mut self, seed: Seed) -> Result<(), SimulationError> {
        seed.validate()?;
        if self.seeded {
            return Err(SimulationError::InvalidConfiguration(
                "simulation is already seeded".into(),
            ));
        }
        match seed {
            Seed::Dot => {
                self.grid.occupy(self.grid.center());
            }
            Seed::Circle { radius } => {
                let radius = i32::try_from(radius).map_err(|_| {
                    SimulationError::InvalidConfiguration(format!(
                        "circle radius {radius} is out of range"
                    ))
                })?;
                self.grid.fill_disc(radius)?;
            }
            Seed::RandomWalk { particles } => {
                self.grid.occupy(self.grid.center());
                let target = particles as u64;
                while self.counters.attached_particles < target {
                    self.launch(Eta::CLASSIC)?;
                }
            }
        }
        self.seeded = true;
        info!(
            seed = %seed.kind(),
            occupied = self.grid.occupied_count(),
            dimension = self.grid.dimension(),
            "seeded cluster"
        );
        Ok(())
    }

    /// Performs one launch cycle under `ETA = n / m`.
    ///
    /// Fails with `InvalidConfiguration` before touching any state if the pair
    /// is unsupported or the cluster has not been seeded.
    pub fn simulate_one_particle(
        &mut self,
        n: u32,
        m: u32,
    ) -> Result<LaunchOutcome, SimulationError> {
        let eta = Eta::new(n, m)?;
        if !self.seeded {
            return Err(SimulationError::InvalidConfiguration(
                "simulation must be seeded before launching particles".into(),
            ));
        }
        self.eta = Some(eta);
        self.launch(eta)
    }

    fn launch(&mut self, eta: Eta) -> Result<LaunchOutcome, SimulationError> {
        let site = self.find_candidate()?;
        if self.accepts(eta, site)? {
            let key = self.accept(site);
            if self
                .counters
                .attached_particles
                .is_multiple_of(self.config.maintenance_interval)
            {
                self.maintain()?;
            }
            Ok(LaunchOutcome::Accepted { site, key })
        } else {
            bump(&mut self.counters.lost_particles, "lost_particles");
            Ok(LaunchOutcome::Rejected { site })
        }
    }

    /// Walks fresh launch points until one attaches to the cluster.
    fn find_candidate(&mut self) -> Result<Site, SimulationError> {
        loop {
            let radius = self.grid.populate_radius();
            let d_row = self.source.offset(radius);
            let d_col = self.source.offset(radius);
            let start = self.grid.center().offset(d_row, d_col);
            let max_steps = step_limit(&self.grid, self.config.walk_step_factor);
            let outcome = walk(&self.grid, start, &mut self.source, max_steps)?;
            bump(&mut self.counters.launch_count, "launch_count");

            // A walker launched inside the cluster can land on an occupied cell;
            // that is no growth site, so it counts as lost.
            if outcome.lost || self.grid.is_occupied(outcome.final_position) {
                bump(&mut self.counters.lost_particles, "lost_particles");
                continue;
            }
            return Ok(outcome.final_position);
        }
    }

    /// Runs the sub-walker trials for `site`; the lattice is not touched.
    fn accepts(&mut self, eta: Eta, site: Site) -> Result<bool, SimulationError> {
        let max_steps = step_limit(&self.grid, self.config.walk_step_factor);
        match eta.regime() {
            Regime::Classic => Ok(true),
            Regime::Erosion { walkers } => {
                for _ in 0..walkers {
                    if !walk(&self.grid, site, &mut self.source, max_steps)?.lost {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Regime::Dendritic { walkers } => {
                let mut finals = HashSet::with_capacity(walkers as usize);
                let mut distinct = true;
                for _ in 0..walkers {
                    let outcome = walk(&self.grid, site, &mut self.source, max_steps)?;
                    if outcome.lost {
                        return Ok(false);
                    }
                    distinct &= finals.insert(outcome.final_position);
                }
                Ok(distinct)
            }
        }
    }

    fn accept(&mut self, site: Site) -> u64 {
        let fresh = self.grid.occupy(site);
        assert!(fresh, "accepted site {site} was already occupied");
        bump(&mut self.counters.attached_particles, "attached_particles");
        let key = self.counters.launch_count;
        self.history.append(key, self.grid.snapshot());
        key
    }

    /// Refreshes the cluster radius, follows it with the populate/kill radii,
    /// and grows the lattice if they outgrew it.
    fn maintain(&mut self) -> Result<(), SimulationError> {
        let cluster_radius = self.grid.refresh_radii(self.config.radius_multiplier);
        let grew = self.grid.expand_if_needed(self.config.max_dimension)?;
        debug!(
            attached = self.counters.attached_particles,
            cluster_radius,
            populate_radius = self.grid.populate_radius(),
            dimension = self.grid.dimension(),
            grew,
            "refreshed cluster geometry"
        );
        Ok(())
    }

    /// Replaces the lattice with the record at or below `key`.
    ///
    /// Counters and history are untouched. On any error, including `NotFound`,
    /// an oversized record or one with no sites, nothing changes.
    pub fn restore(&mut self, key: u64) -> Result<u64, SimulationError> {
        let (found, snapshot) = self.history.lookup(key)?;
        check_restorable(&self.config, found, snapshot)?;
        self.grid = snapshot.restore()?;
        Ok(found)
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn into_history(self) -> History {
        self.history
    }

    #[must_use]
    pub const fn counters(&self) -> Counters {
        self.counters
    }

    #[must_use]
    pub const fn launch_count(&self) -> u64 {
        self.counters.launch_count
    }

    #[must_use]
    pub const fn attached_particles(&self) -> u64 {
        self.counters.attached_particles
    }

    #[must_use]
    pub const fn lost_particles(&self) -> u64 {
        self.counters.lost_particles
    }

    #[must_use]
    pub const fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// ETA of the most recent launch, if any.
    #[must_use]
    pub const fn eta(&self) -> Option<Eta> {
        self.eta
    }

    /// Current occupied set and lattice side length.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.grid.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::scripted::ScriptedSource;

    const SOUTH: usize = 1;
    const WEST: usize = 2;
    const EAST: usize = 3;
    const NORTH_EAST: usize = 5;
    const SOUTH_WEST: usize = 6;

    fn config(radius: i32) -> SimulationConfig {
        SimulationConfig {
            initial_populate_radius: radius,
            rng_seed: Some(0),
            ..SimulationConfig::default()
        }
    }

    fn dot_simulation(radius: i32, source: ScriptedSource) -> Simulation<ScriptedSource> {
        let mut sim = Simulation::with_source(config(radius), source).expect("simulation");
        sim.initialize(Seed::Dot).expect("seed");
        sim
    }

    /// Launch three cells east of center on a 20×20 lattice and drift west onto
    /// the seed, yielding candidate (10, 11).
    fn candidate_next_to_seed() -> ScriptedSource {
        ScriptedSource::new().launch_at(0, 3).steps(&[WEST, WEST])
    }

    #[test]
    fn classic_launch_attaches_next_to_seed() {
        let source = ScriptedSource::new().launch_at(0, 3).steps(&[WEST, WEST]);
        let mut sim = dot_simulation(50, source);
        assert_eq!(sim.grid().dimension(), 100);
        let seed = sim.grid().center();

        let outcome = sim.simulate_one_particle(1, 1).expect("launch");

        let site = Site::new(50, 51);
        assert_eq!(outcome, LaunchOutcome::Accepted { site, key: 1 });
        assert!(site.distance_sq(seed) <= 2);
        assert_eq!(sim.attached_particles(), 1);
        assert_eq!(sim.grid().occupied_count(), 2);
        assert_eq!(sim.history().len(), 1);
        let (key, snapshot) = sim.history().latest().expect("record");
        assert_eq!(key, 1);
        assert_eq!(snapshot.dimension(), 100);
        assert_eq!(snapshot.sites(), &[seed, site]);
        // No sub-walker draws were consumed.
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn erosion_accepts_when_every_subwalker_escapes() {
        let source = candidate_next_to_seed()
            .repeat(EAST, 7)
            .repeat(EAST, 7)
            .repeat(EAST, 7);
        let mut sim = dot_simulation(10, source);

        let outcome = sim.simulate_one_particle(3, 1).expect("launch");

        assert_eq!(
            outcome,
            LaunchOutcome::Accepted {
                site: Site::new(10, 11),
                key: 1
            }
        );
        assert!(sim.grid().is_occupied(Site::new(10, 11)));
        assert_eq!(sim.counters().lost_particles, 0);
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn erosion_rejects_when_a_subwalker_returns() {
        let source = candidate_next_to_seed().steps(&[NORTH_EAST, WEST]);
        let mut sim = dot_simulation(10, source);
        let before = sim.grid().clone();

        let outcome = sim.simulate_one_particle(3, 1).expect("launch");

        assert_eq!(
            outcome,
            LaunchOutcome::Rejected {
                site: Site::new(10, 11)
            }
        );
        assert_eq!(sim.grid(), &before);
        assert_eq!(
            sim.counters(),
            Counters {
                launch_count: 1,
                attached_particles: 0,
                lost_particles: 1
            }
        );
        assert!(sim.history().is_empty());
        // The remaining two sub-walkers never ran.
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn dendritic_rejects_shared_landing_sites() {
        let source = candidate_next_to_seed()
            .steps(&[NORTH_EAST, WEST])
            .steps(&[NORTH_EAST, WEST])
            .steps(&[SOUTH_WEST]);
        let mut sim = dot_simulation(10, source);
        let before = sim.grid().clone();

        let outcome = sim.simulate_one_particle(1, 3).expect("launch");

        assert!(!outcome.is_accepted());
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.lost_particles(), 1);
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn dendritic_accepts_distinct_landing_sites() {
        let source = candidate_next_to_seed()
            .steps(&[NORTH_EAST, WEST])
            .steps(&[SOUTH_WEST])
            .steps(&[SOUTH]);
        let mut sim = dot_simulation(10, source);

        let outcome = sim.simulate_one_particle(1, 3).expect("launch");

        assert!(outcome.is_accepted());
        assert_eq!(outcome.site(), Site::new(10, 11));
        assert_eq!(sim.attached_particles(), 1);
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn dendritic_rejects_on_first_lost_subwalker() {
        let source = candidate_next_to_seed().repeat(EAST, 7);
        let mut sim = dot_simulation(10, source);

        let outcome = sim.simulate_one_particle(1, 2).expect("launch");

        assert!(!outcome.is_accepted());
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn lost_candidates_are_retried_and_counted() {
        let source = ScriptedSource::new()
            .launch_at(0, 3)
            .repeat(EAST, 5)
            .launch_at(0, 3)
            .steps(&[WEST, WEST]);
        let mut sim = dot_simulation(10, source);

        let outcome = sim.simulate_one_particle(1, 1).expect("launch");

        assert_eq!(
            outcome,
            LaunchOutcome::Accepted {
                site: Site::new(10, 11),
                key: 2
            }
        );
        assert_eq!(
            sim.counters(),
            Counters {
                launch_count: 2,
                attached_particles: 1,
                lost_particles: 1
            }
        );
    }

    #[test]
    fn landing_on_an_occupied_cell_is_not_a_candidate() {
        let source = ScriptedSource::new()
            .launch_at(0, 1)
            .steps(&[WEST])
            .launch_at(0, 3)
            .steps(&[WEST, WEST]);
        let mut sim = dot_simulation(10, source);

        let outcome = sim.simulate_one_particle(1, 1).expect("launch");

        assert_eq!(outcome.site(), Site::new(10, 11));
        assert_eq!(sim.launch_count(), 2);
        assert_eq!(sim.lost_particles(), 1);
        assert_eq!(sim.grid().occupied_count(), 2);
    }

    #[test]
    fn unsupported_eta_fails_before_any_mutation() {
        let mut sim = dot_simulation(10, ScriptedSource::new());
        let before = sim.grid().clone();
        for (n, m) in [(3, 2), (0, 1), (1, 0)] {
            assert!(matches!(
                sim.simulate_one_particle(n, m),
                Err(SimulationError::InvalidConfiguration(_))
            ));
        }
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.counters(), Counters::default());
        assert!(sim.eta().is_none());
    }

    #[test]
    fn launching_requires_a_seed() {
        let mut sim =
            Simulation::with_source(config(10), ScriptedSource::new()).expect("simulation");
        assert!(matches!(
            sim.simulate_one_particle(1, 1),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        sim.initialize(Seed::Dot).expect("seed");
        assert!(sim.initialize(Seed::Dot).is_err());
        assert_eq!(sim.grid().occupied_count(), 1);
    }

    #[test]
    fn invalid_seeds_leave_the_lattice_empty() {
        let mut sim =
            Simulation::with_source(config(10), ScriptedSource::new()).expect("simulation");
        assert!(sim.initialize(Seed::Circle { radius: -2 }).is_err());
        assert!(sim.initialize(Seed::Circle { radius: 40 }).is_err());
        assert!(sim.initialize(Seed::RandomWalk { particles: -1 }).is_err());
        assert_eq!(sim.grid().occupied_count(), 0);
        assert!(!sim.is_seeded());

        sim.initialize(Seed::Circle { radius: 1 }).expect("circle");
        assert_eq!(sim.grid().occupied_count(), 5);
        assert!(sim.history().is_empty());
    }

    #[test]
    fn random_walk_seed_grows_through_classic_launches() {
        let source = candidate_next_to_seed().launch_at(0, -3).steps(&[EAST, EAST]);
        let mut sim = Simulation::with_source(config(10), source).expect("simulation");

        sim.initialize(Seed::RandomWalk { particles: 2 }).expect("seed");

        assert_eq!(sim.attached_particles(), 2);
        assert_eq!(sim.grid().occupied_count(), 3);
        assert!(sim.grid().is_occupied(Site::new(10, 9)));
        let keys: Vec<u64> = sim.history().iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![1, 2]);
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn restore_miss_leaves_state_unchanged() {
        let mut sim = dot_simulation(10, candidate_next_to_seed());
        sim.simulate_one_particle(1, 1).expect("launch");
        let before = sim.grid().clone();

        assert!(matches!(
            sim.restore(0),
            Err(SimulationError::History(HistoryError::NotFound { key: 0 }))
        ));
        assert_eq!(sim.grid(), &before);

        assert_eq!(sim.restore(99).expect("floor"), 1);
        assert_eq!(sim.grid().occupied_count(), 2);
        assert_eq!(sim.attached_particles(), 1);
    }

    #[test]
    fn maintenance_runs_on_every_tenth_acceptance() {
        // Grow a horizontal bar one cell east, then one west, out to ±5.
        let mut source = ScriptedSource::new();
        for k in 1..=5 {
            source = source
                .launch_at(0, k + 1)
                .steps(&[WEST])
                .launch_at(0, -(k + 1))
                .steps(&[EAST]);
        }
        let mut sim = dot_simulation(10, source);

        for _ in 0..9 {
            assert!(sim.simulate_one_particle(1, 1).expect("launch").is_accepted());
            assert_eq!(sim.grid().cluster_radius(), 0.0);
            assert_eq!(sim.grid().populate_radius(), 10);
            assert_eq!(sim.grid().kill_radius(), 10);
            assert_eq!(sim.grid().dimension(), 20);
        }

        let outcome = sim.simulate_one_particle(1, 1).expect("launch");

        assert_eq!(
            outcome,
            LaunchOutcome::Accepted {
                site: Site::new(10, 5),
                key: 10
            }
        );
        assert_eq!(sim.grid().cluster_radius(), 5.0);
        assert_eq!(sim.grid().populate_radius(), 15);
        assert_eq!(sim.grid().kill_radius(), 15);
        assert_eq!(sim.grid().dimension(), 30);
        assert_eq!(sim.grid().center(), Site::new(15, 15));
        assert!(sim.grid().is_occupied(Site::new(15, 10)));
        assert!(sim.grid().is_occupied(Site::new(15, 20)));
        assert_eq!(sim.grid().occupied_count(), 11);
        // The record is written before the lattice grows.
        let (_, latest) = sim.history().latest().expect("record");
        assert_eq!(latest.dimension(), 20);
        assert!(sim.source.is_exhausted());
    }

    #[test]
    fn resume_rejects_a_record_without_sites() {
        let mut history = History::new();
        history.append(4, Snapshot::new(Vec::new(), 40));
        let result = Simulation::resume(config(10), history, ScriptedSource::new());
        assert!(matches!(
            result,
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn restore_rejects_unusable_records_without_change() {
        let mut sim = dot_simulation(10, candidate_next_to_seed());
        sim.simulate_one_particle(1, 1).expect("launch");
        let before = sim.grid().clone();
        let mut history = sim.history().clone();
        history.append(5, Snapshot::new(Vec::new(), 20));
        history.append(9, Snapshot::new(vec![Site::new(1, 1)], u32::MAX));
        sim.history = history;

        assert!(matches!(
            sim.restore(5),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            sim.restore(9),
            Err(SimulationError::ResourceExhausted(_))
        ));
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.restore(4).expect("floor"), 1);
    }

    #[test]
    fn counters_render_status_line() {
        let counters = Counters {
            launch_count: 12,
            attached_particles: 5,
            lost_particles: 7,
        };
        assert_eq!(counters.to_string(), "Launched: 12, Attached: 5, Lost: 7");
    }
}
