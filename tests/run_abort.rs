// Aborting a run must discard every worker contribution and write nothing

use edep_tally::config::ScoringConfig;
use edep_tally::error::ScoringError;
use edep_tally::hooks::TransportHooks;
use edep_tally::run::{MasterScorer, RunCollector};
use edep_tally::step::{StepSample, VolumeId};
use edep_tally::worker::WorkerScorer;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn setup(dir: &TempDir) -> (Arc<ScoringConfig>, Arc<RunCollector>, MasterScorer) {
    let mut config = ScoringConfig::new();
    config.set_detector_mass(0.04);
    config.output.summary_path = dir.path().join("dose_output.txt");
    config.output.profile_path = dir.path().join("depth_profile.txt");
    config.collect_timeout_secs = 30;
    let config = Arc::new(config);
    let collector = Arc::new(RunCollector::new());
    let master = MasterScorer::new(config.clone(), collector.clone()).unwrap();
    (config, collector, master)
}

fn score_one_event(worker: &mut WorkerScorer, run_id: u32, event_id: u64) {
    worker
        .on_step(&StepSample::new(VolumeId::Shield, 0.5, 20.0, event_id, run_id))
        .unwrap();
    worker
        .on_step(&StepSample::new(VolumeId::Detector, 2.0, 170.0, event_id, run_id))
        .unwrap();
    worker.on_event_end(event_id).unwrap();
}

#[test]
fn test_abort_after_two_of_three_workers() {
    let tmp = TempDir::new().unwrap();
    let (config, collector, mut master) = setup(&tmp);
    master.on_run_start(0, 3).unwrap();

    let mut workers: Vec<WorkerScorer> = (0..3)
        .map(|w| WorkerScorer::new(w, config.clone(), collector.clone()).unwrap())
        .collect();
    for (w, worker) in workers.iter_mut().enumerate() {
        worker.on_run_start(0, 3).unwrap();
        score_one_event(worker, 0, w as u64);
    }

    workers[0].on_run_end(0).unwrap();
    workers[1].on_run_end(0).unwrap();
    assert_eq!(collector.received(0), 2);

    master.abort_run(0);
    assert_eq!(collector.received(0), 0);

    // The third worker's late report is refused
    assert!(matches!(
        workers[2].on_run_end(0),
        Err(ScoringError::RunAborted { run_id: 0 })
    ));
    assert!(matches!(
        master.on_run_end(0),
        Err(ScoringError::RunNotActive { run_id: 0 })
    ));

    assert!(master.results().is_empty());
    assert!(!tmp.path().join("dose_output.txt").exists());
    assert!(!tmp.path().join("depth_profile.txt").exists());
}

#[test]
fn test_abort_does_not_touch_previous_run_files() {
    let tmp = TempDir::new().unwrap();
    let (config, collector, mut master) = setup(&tmp);

    // Run 0 completes normally
    master.on_run_start(0, 1).unwrap();
    let mut worker = WorkerScorer::new(0, config.clone(), collector.clone()).unwrap();
    worker.on_run_start(0, 1).unwrap();
    score_one_event(&mut worker, 0, 0);
    worker.on_run_end(0).unwrap();
    master.on_run_end(0).unwrap();

    let summary_before = fs::read_to_string(tmp.path().join("dose_output.txt")).unwrap();
    let profile_before = fs::read_to_string(tmp.path().join("depth_profile.txt")).unwrap();

    // Run 1 is aborted mid-flight
    master.on_run_start(1, 1).unwrap();
    worker.on_run_start(1, 1).unwrap();
    score_one_event(&mut worker, 1, 0);
    master.abort_run(1);
    worker.abort_run(1);

    assert_eq!(
        fs::read_to_string(tmp.path().join("dose_output.txt")).unwrap(),
        summary_before
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("depth_profile.txt")).unwrap(),
        profile_before
    );
    assert_eq!(master.results().len(), 1);
}

#[test]
fn test_abort_wakes_waiting_master() {
    let tmp = TempDir::new().unwrap();
    let (config, collector, mut master) = setup(&tmp);
    master.on_run_start(5, 2).unwrap();

    let mut worker = WorkerScorer::new(0, config, collector.clone()).unwrap();
    worker.on_run_start(5, 2).unwrap();
    score_one_event(&mut worker, 5, 0);
    worker.on_run_end(5).unwrap();

    // Abort from another thread while the master is blocked at the barrier
    let aborter = {
        let collector = collector.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            collector.abort(5)
        })
    };

    let err = master.finish_run(5).unwrap_err();
    assert!(matches!(err, ScoringError::RunAborted { run_id: 5 }));
    assert_eq!(aborter.join().unwrap(), 1);
    assert!(!tmp.path().join("dose_output.txt").exists());
}
