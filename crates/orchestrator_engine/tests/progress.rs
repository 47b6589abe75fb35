use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchestrator_core::{AnalysisType, ProgressUpdate, TimelineStatus};
use orchestrator_engine::{ProgressCallback, ProgressEstimator};
use pretty_assertions::assert_eq;

type Seen = Arc<Mutex<Vec<(ProgressUpdate, Duration)>>>;

fn recorder() -> (ProgressCallback, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |update, elapsed| {
        sink.lock().unwrap().push((update, elapsed));
    });
    (callback, seen)
}

fn percents(seen: &Seen) -> Vec<u8> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|(update, _)| update.progress_percent)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn stages_fire_in_order_then_complete() {
    let estimator = ProgressEstimator::new();
    let (callback, seen) = recorder();
    estimator.start(1, AnalysisType::Occupancy, callback);
    assert_eq!(percents(&seen), vec![5]);

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(percents(&seen), vec![5, 15, 35, 65, 85, 95]);
    assert_eq!(estimator.pending_timers(1), 0, "last stage arms nothing");

    let last = estimator.complete(1).unwrap();
    assert_eq!(
        last,
        ProgressUpdate {
            stage_index: 5,
            progress_percent: 100
        }
    );
    assert_eq!(percents(&seen).last(), Some(&100));
    assert_eq!(estimator.tracked_jobs(), 0);

    let indices: Vec<usize> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|(update, _)| update.stage_index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 5]);
}

#[tokio::test(start_paused = true)]
async fn stage_one_fires_after_planned_duration() {
    let estimator = ProgressEstimator::new();
    let (callback, seen) = recorder();
    // Occupancy runs 180s; stage 0 takes 2% of it.
    estimator.start(3, AnalysisType::Occupancy, callback);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(percents(&seen), vec![5]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(percents(&seen), vec![5, 15]);

    let (_, elapsed) = seen.lock().unwrap()[1];
    assert_eq!(elapsed, Duration::from_millis(3_600));
}

#[tokio::test(start_paused = true)]
async fn pause_keeps_elapsed_time_within_stage() {
    let estimator = ProgressEstimator::new();
    let (callback, seen) = recorder();
    estimator.start(9, AnalysisType::Occupancy, callback);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(estimator.pause(9));
    assert!(!estimator.pause(9), "already paused");
    assert_eq!(estimator.status(9), Some(TimelineStatus::Paused));
    assert_eq!(estimator.pending_timers(9), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(percents(&seen), vec![5]);

    assert!(estimator.resume(9));
    assert_eq!(estimator.pending_timers(9), 1);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(percents(&seen), vec![5]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(percents(&seen), vec![5, 15]);
    assert_eq!(
        estimator.snapshot(9),
        Some(ProgressUpdate {
            stage_index: 1,
            progress_percent: 15
        })
    );
}

#[tokio::test(start_paused = true)]
async fn comprehensive_stages_run_longer() {
    let estimator = ProgressEstimator::new();
    let (callback, seen) = recorder();
    estimator.start(4, AnalysisType::Comprehensive, callback);

    // 2% of 600s.
    tokio::time::sleep(Duration::from_millis(11_900)).await;
    assert_eq!(percents(&seen), vec![5]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(percents(&seen), vec![5, 15]);
    assert!(estimator.cancel(4));
}

#[tokio::test(start_paused = true)]
async fn jobs_are_independent() {
    let estimator = ProgressEstimator::new();
    let (first, first_seen) = recorder();
    let (second, second_seen) = recorder();
    estimator.start(1, AnalysisType::Occupancy, first);
    estimator.start(2, AnalysisType::Occupancy, second);

    assert!(estimator.cancel(1));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(percents(&first_seen), vec![5]);
    assert_eq!(percents(&second_seen), vec![5, 15]);
    assert_eq!(estimator.complete(1), None);
}
