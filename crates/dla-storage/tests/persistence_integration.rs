use dla_core::{Seed, Simulation, SimulationConfig};
use dla_storage::CheckpointStore;
use rand::{SeedableRng, rngs::SmallRng};
use tempfile::tempdir;

fn config() -> SimulationConfig {
    SimulationConfig {
        initial_populate_radius: 10,
        rng_seed: Some(0x5EED),
        ..SimulationConfig::default()
    }
}

#[test]
fn checkpoint_survives_restart_and_resumes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = CheckpointStore::open(dir.path().join("runs").join("dla-1-1.dla"))?;

    let mut sim = Simulation::new(config())?;
    sim.initialize(Seed::RandomWalk { particles: 5 })?;
    while sim.attached_particles() < 30 {
        sim.simulate_one_particle(1, 1)?;
    }
    store.save(sim.history())?;

    // Work after the last save is lost on restart.
    while sim.attached_particles() < 35 {
        sim.simulate_one_particle(1, 1)?;
    }
    drop(sim);

    let history = store.load()?;
    assert_eq!(history.len(), 30);
    let last_key = history.last_key().expect("records");

    let mut resumed = Simulation::resume(config(), history, SmallRng::seed_from_u64(1))?;
    assert_eq!(resumed.attached_particles(), 30);
    assert_eq!(resumed.launch_count(), last_key);
    while resumed.attached_particles() < 40 {
        resumed.simulate_one_particle(1, 1)?;
    }
    store.save(resumed.history())?;

    let reloaded = store.load()?;
    assert_eq!(reloaded.len(), 40);
    assert_eq!(&reloaded, resumed.history());
    assert!(reloaded.iter().skip(30).all(|(key, _)| key > last_key));
    Ok(())
}

#[test]
fn repeated_saves_replace_the_checkpoint() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = CheckpointStore::open(dir.path().join("run.dla"))?;
    let mut sim = Simulation::new(config())?;
    sim.initialize(Seed::Dot)?;

    for target in [5, 10, 15] {
        while sim.attached_particles() < target {
            sim.simulate_one_particle(1, 2)?;
        }
        let report = store.save(sim.history())?;
        assert_eq!(report.records as u64, target);
        assert_eq!(store.load()?.len() as u64, target);
    }
    Ok(())
}
