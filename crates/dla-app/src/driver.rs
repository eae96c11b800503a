//! Long-running launch loop with throttled checkpoints and cooperative stop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use dla_core::{Counters, Eta, RandomSource, Simulation};
use dla_storage::{CheckpointStore, SaveReport};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default wall-clock interval between checkpoint saves.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(3_600);

/// Parameters for one driver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub n: u32,
    pub m: u32,
    /// Stop once this many particles have attached.
    pub target: u64,
    pub save_interval: Duration,
    /// Log the status line every this many attachments.
    pub progress_every: u64,
}

impl RunOptions {
    pub fn new(n: u32, m: u32, target: u64) -> Self {
        Self {
            n,
            m,
            target,
            save_interval: DEFAULT_SAVE_INTERVAL,
            progress_every: 100,
        }
    }

    /// Rejects option sets the loop could never finish with.
    pub fn validate(&self) -> Result<Eta> {
        if self.target == 0 {
            bail!("target particle count must be positive");
        }
        if self.progress_every == 0 {
            bail!("progress interval must be positive");
        }
        let eta = Eta::new(self.n, self.m).context("unsupported stickiness")?;
        Ok(eta)
    }
}

/// Wall-clock save throttle: due once `interval` has passed since the last save.
#[derive(Debug, Clone, Copy)]
pub struct SaveThrottle {
    interval: Duration,
    last_save: Instant,
}

impl SaveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_save: now,
        }
    }

    #[must_use]
    pub fn due(&self) -> bool {
        self.due_at(Instant::now())
    }

    #[must_use]
    pub fn due_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_save) > self.interval
    }

    pub fn mark(&mut self) {
        self.mark_at(Instant::now());
    }

    pub fn mark_at(&mut self, now: Instant) {
        self.last_save = now;
    }
}

/// What a finished or interrupted run did.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub counters: Counters,
    pub saves: u32,
    /// True when the stop flag ended the run before `target`.
    pub stopped: bool,
    pub last_key: Option<u64>,
}

/// Launches particles until `options.target` attach or `stop` is raised.
///
/// Checkpoints whenever the throttle is due and once more at the end, so an
/// interrupted run can be resumed from its latest record.
pub fn run_simulation<R: RandomSource>(
    sim: &mut Simulation<R>,
    store: &CheckpointStore,
    options: &RunOptions,
    stop: &AtomicBool,
) -> Result<RunReport> {
    let eta = options.validate()?;
    let started = Instant::now();
    let mut throttle = SaveThrottle::new(options.save_interval);
    let mut saves = 0_u32;
    let mut stopped = false;

    info!(
        %eta,
        target = options.target,
        attached = sim.attached_particles(),
        checkpoint = %store.path().display(),
        "starting run"
    );

    while sim.attached_particles() < options.target {
        if stop.load(Ordering::Relaxed) {
            warn!(counters = %sim.counters(), "stop requested; saving checkpoint");
            stopped = true;
            break;
        }

        let outcome = sim
            .simulate_one_particle(options.n, options.m)
            .context("launch failed")?;
        if outcome.is_accepted() && sim.attached_particles().is_multiple_of(options.progress_every)
        {
            info!(counters = %sim.counters(), dimension = sim.grid().dimension(), "progress");
        }

        if throttle.due() {
            save(store, sim, &mut saves)?;
            throttle.mark();
        }
    }

    let report = save(store, sim, &mut saves)?;
    info!(
        counters = %sim.counters(),
        saves,
        stopped,
        elapsed_s = started.elapsed().as_secs_f64(),
        "run finished"
    );
    Ok(RunReport {
        counters: sim.counters(),
        saves,
        stopped,
        last_key: report.last_key,
    })
}

fn save<R: RandomSource>(
    store: &CheckpointStore,
    sim: &Simulation<R>,
    saves: &mut u32,
) -> Result<SaveReport> {
    let report = store
        .save(sim.history())
        .with_context(|| format!("failed to save checkpoint {}", store.path().display()))?;
    *saves += 1;
    info!(counters = %sim.counters(), records = report.records, "checkpoint written");
    Ok(report)
}

/// Spawns a listener thread that raises the returned flag on Ctrl-C.
pub fn install_stop_handler() -> io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let listener = Arc::clone(&flag);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("dla-stop".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("interrupt received; finishing current launch");
                        listener.store(true, Ordering::Relaxed);
                    }
                    Err(err) => debug!(error = %err, "interrupt listener unavailable"),
                }
            });
        })?;
    Ok(flag)
}
