// Drives the scoring engine with a toy beam instead of a real transport code.
//
// Each worker thread generates events of a pencil beam entering a shield slab:
// deposits fall off exponentially with depth and a fraction of the primaries
// reach the detector behind the slab. Like a real engine the toy geometry
// knows its volumes by name; names are mapped through the `volumes` section
// of the configuration.
//
// Usage: cargo run --example synthetic_beam -- [config.json] [events] [workers]

use edep_tally::config::ScoringConfig;
use edep_tally::hooks::TransportHooks;
use edep_tally::run::{MasterScorer, RunCollector};
use edep_tally::step::{StepSample, VolumeNames};
use edep_tally::worker::WorkerScorer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const SHIELD_THICKNESS_MM: f64 = 50.0;
const ATTENUATION_LENGTH_MM: f64 = 18.0;
const BEAM_ENERGY_MEV: f64 = 1.0;
const STEP_MM: f64 = 0.5;

/// Physical volume names of the toy geometry
const SHIELD_VOLUME: &str = "Shield";
const DETECTOR_VOLUME: &str = "Detector";

/// One primary through the slab, reported step by step
fn transport_event<R: Rng>(
    rng: &mut R,
    volumes: &VolumeNames,
    run_id: u32,
    event_id: u64,
    hooks: &mut impl TransportHooks,
) {
    let mut energy = BEAM_ENERGY_MEV;
    let mut depth = 0.0;
    while depth < SHIELD_THICKNESS_MM && energy > 0.0 {
        let absorbed = rng.gen::<f64>() < STEP_MM / ATTENUATION_LENGTH_MM;
        let deposit = if absorbed {
            energy
        } else {
            (energy * rng.gen_range(0.0..0.01)).min(energy)
        };
        energy -= deposit;
        let next_depth = depth + STEP_MM;
        let next_volume = if next_depth >= SHIELD_THICKNESS_MM && energy > 0.0 {
            DETECTOR_VOLUME
        } else {
            SHIELD_VOLUME
        };
        let sample = StepSample::new(
            volumes.resolve(SHIELD_VOLUME),
            deposit,
            depth + 0.5 * STEP_MM,
            event_id,
            run_id,
        )
        .crossing_into(volumes.resolve(next_volume));
        if let Err(e) = hooks.on_step(&sample) {
            log::error!("step rejected: {}", e);
        }
        depth = next_depth;
    }

    // Whatever survives the slab is absorbed in the detector
    if energy > 0.0 {
        let sample = StepSample::new(
            volumes.resolve(DETECTOR_VOLUME),
            energy,
            SHIELD_THICKNESS_MM + 1.0,
            event_id,
            run_id,
        );
        if let Err(e) = hooks.on_step(&sample) {
            log::error!("step rejected: {}", e);
        }
    }
    if let Err(e) = hooks.on_event_end(event_id) {
        log::error!("event {} rejected: {}", event_id, e);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = match args.get(1) {
        Some(path) => match ScoringConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            let mut config = ScoringConfig::new();
            config.set_detector_mass(0.04);
            config.set_histogram(100, SHIELD_THICKNESS_MM);
            config
        }
    };
    if let Err(e) = config.apply_env_overrides() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    let events: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let workers: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(4);

    let config = Arc::new(config);
    let collector = Arc::new(RunCollector::new());
    let mut master = match MasterScorer::new(config.clone(), collector.clone()) {
        Ok(master) => master,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let run_id = 0;
    let start = Instant::now();
    if let Err(e) = master.on_run_start(run_id, workers) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    thread::scope(|s| {
        for w in 0..workers {
            let config = config.clone();
            let collector = collector.clone();
            s.spawn(move || {
                let mut scorer = match WorkerScorer::new(w, config.clone(), collector) {
                    Ok(scorer) => scorer,
                    Err(e) => {
                        log::error!("worker {} failed to start: {}", w, e);
                        return;
                    }
                };
                let mut rng = StdRng::seed_from_u64(1000 + w as u64);
                if let Err(e) = scorer.on_run_start(run_id, workers) {
                    log::error!("worker {}: {}", w, e);
                    return;
                }
                // Disjoint event ids: worker w takes every workers-th event
                let mut event_id = w as u64;
                while event_id < events {
                    transport_event(&mut rng, &config.volumes, run_id, event_id, &mut scorer);
                    event_id += workers as u64;
                }
                if let Err(e) = scorer.on_run_end(run_id) {
                    log::error!("worker {}: {}", w, e);
                }
            });
        }
    });

    match master.finish_run(run_id) {
        Ok(result) => {
            println!("{}", result);
            println!(
                "Simulated {} primaries on {} workers in {:.2?}",
                events,
                workers,
                start.elapsed()
            );
        }
        Err(e) => {
            eprintln!("Run {} failed: {}", run_id, e);
            std::process::exit(1);
        }
    }
}
