// Driver behaviour of UploadSimulator under a paused Tokio clock.
//
// Covers:
//   - initial record state and submission order
//   - stage/status derivation on every tick
//   - terminal completion and no further mutation
//   - lazy removal: idempotent, driver exits on its next tick
//   - independent drivers: removing one does not disturb another
//   - event stream ordering per record
//   - shutdown aborting running drivers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lexdesk_core::{
    config::SimulationConfig,
    simulator::UploadSimulator,
    source::{RandomSource, ScriptedSource},
    stages::stage_for_progress,
    RawFile, UploadEvent, UploadStatus,
};
use tracing_test::traced_test;

fn contract() -> RawFile {
    RawFile::new("contract.pdf", 2048, "application/pdf")
}

/// Every tick adds `step`; ticks are one second apart.
fn steady(step: f64) -> Arc<UploadSimulator> {
    let source = ScriptedSource::new([])
        .with_fallback(step)
        .with_delay(Duration::from_secs(1));
    UploadSimulator::new(Arc::new(source), 256)
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_submit_creates_initial_record() {
    let sim = steady(10.0);
    let created = sim.submit(vec![contract()]);

    assert_eq!(created.len(), 1);
    let file = &created[0];
    assert_eq!(file.name, "contract.pdf");
    assert_eq!(file.size, 2048);
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.progress, 0.0);
    assert_eq!(file.status, UploadStatus::Uploading);
    assert_eq!(file.current_stage, 0);

    // No await yet, so the driver has not ticked.
    let listed = sim.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, UploadStatus::Uploading);
    assert_eq!(sim.in_flight(), vec![file.id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_submit_empty_is_noop() {
    let sim = steady(10.0);
    sim.submit(vec![contract()]);
    let before = sim.list().len();

    assert!(sim.submit(Vec::new()).is_empty());
    assert_eq!(sim.list().len(), before);
}

#[tokio::test(start_paused = true)]
async fn test_submit_many_keeps_order_and_distinct_ids() {
    let sim = steady(10.0);
    sim.submit(vec![RawFile::new("first.pdf", 1, "")]);
    let names = ["a.pdf", "b.docx", "c.png", "d.jpg", "e.doc"];
    let created = sim.submit(names.iter().map(|n| RawFile::new(*n, 10, "")).collect());

    assert_eq!(created.len(), names.len());
    let listed: Vec<String> = sim.list().into_iter().map(|f| f.name).collect();
    assert_eq!(listed, ["first.pdf", "a.pdf", "b.docx", "c.png", "d.jpg", "e.doc"]);

    let mut ids: Vec<String> = sim.list().into_iter().map(|f| f.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

// =============================================================================
// Ticks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_tick_reports_processing() {
    let sim = steady(10.0);
    let id = sim.submit(vec![contract()])[0].id.clone();

    advance(1).await;
    let file = sim.get(&id).unwrap();
    assert_eq!(file.progress, 10.0);
    assert_eq!(file.status, UploadStatus::Processing);
    assert_eq!(file.current_stage, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stage_follows_thresholds() {
    let sim = steady(12.5);
    let id = sim.submit(vec![contract()])[0].id.clone();

    // Ticks at t = 0s, 1s, 2s, ... adding 12.5 each time.
    let expected = [
        (12.5, 1),
        (25.0, 1),
        (37.5, 2),
        (50.0, 2),
        (62.5, 3),
        (75.0, 3),
        (87.5, 4),
    ];
    advance(1).await;
    for (progress, stage) in expected {
        let file = sim.get(&id).unwrap();
        assert_eq!(file.progress, progress);
        assert_eq!(file.current_stage, stage, "at {progress}%");
        assert_eq!(file.status, UploadStatus::Processing);
        advance(1000).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_contract_completes_and_stays_completed() {
    let sim = steady(10.0);
    let id = sim.submit(vec![contract()])[0].id.clone();

    // Tenth tick (t = 9s) reaches 100.
    advance(8_500).await;
    assert_eq!(sim.get(&id).unwrap().status, UploadStatus::Processing);

    advance(1_000).await;
    let done = sim.get(&id).unwrap();
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.status, UploadStatus::Completed);
    assert_eq!(done.current_stage, 4);
    assert!(done.completed_at.is_some());
    assert!(sim.in_flight().is_empty());

    advance(30_000).await;
    assert_eq!(sim.get(&id).unwrap(), done);
}

#[tokio::test(start_paused = true)]
async fn test_overshoot_is_clamped_to_hundred() {
    let source = ScriptedSource::new([60.0, 60.0]).with_delay(Duration::from_millis(10));
    let sim = UploadSimulator::new(Arc::new(source), 16);
    let id = sim.submit(vec![contract()])[0].id.clone();

    advance(50).await;
    let file = sim.get(&id).unwrap();
    assert_eq!(file.progress, 100.0);
    assert_eq!(file.status, UploadStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_negative_and_nan_increments_do_not_regress() {
    let source = ScriptedSource::new([30.0, -20.0, f64::NAN, 5.0])
        .with_fallback(0.0)
        .with_delay(Duration::from_millis(100));
    let sim = UploadSimulator::new(Arc::new(source), 16);
    let id = sim.submit(vec![contract()])[0].id.clone();

    let mut last = 0.0;
    for _ in 0..5 {
        advance(100).await;
        let progress = sim.get(&id).unwrap().progress;
        assert!(progress >= last);
        last = progress;
    }
    assert_eq!(last, 35.0);
    sim.shutdown();
}

// =============================================================================
// Random source properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_random_runs_satisfy_invariants() {
    let config = SimulationConfig {
        tick_min_ms: 800,
        tick_jitter_ms: 400,
        ..SimulationConfig::default()
    };
    let sim = UploadSimulator::new(Arc::new(RandomSource::new(&config)), 1024);
    let mut rx = sim.subscribe();
    let created = sim.submit((0..5).map(|i| RawFile::new(format!("doc{i}.pdf"), i, "")).collect());

    let mut last: HashMap<String, (f64, u8)> = HashMap::new();
    let mut completed = 0;
    while completed < created.len() {
        match rx.recv().await.unwrap() {
            UploadEvent::Submitted { file } => {
                assert_eq!(file.progress, 0.0);
                last.insert(file.id, (0.0, 0));
            }
            UploadEvent::Progress { file } => {
                let (progress, stage) = last[&file.id];
                assert!(file.progress >= progress);
                assert!(file.progress < 100.0);
                assert!(file.current_stage >= stage);
                assert_eq!(file.current_stage, stage_for_progress(file.progress));
                assert_eq!(file.status, UploadStatus::Processing);
                last.insert(file.id, (file.progress, file.current_stage));
            }
            UploadEvent::Completed { file } => {
                assert_eq!(file.progress, 100.0);
                assert_eq!(file.current_stage, 4);
                completed += 1;
            }
            UploadEvent::Removed { .. } => panic!("nothing was removed"),
        }
    }
    assert_eq!(sim.counts().completed, 5);
    assert!(sim.in_flight().is_empty());
}

// =============================================================================
// Removal
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_remove_is_idempotent() {
    let sim = steady(10.0);
    let id = sim.submit(vec![contract()])[0].id.clone();

    assert!(sim.remove(&id).is_some());
    assert!(sim.remove(&id).is_none());
    assert!(sim.remove("does-not-exist").is_none());
    assert!(sim.list().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_removed_driver_exits_on_next_tick() {
    let sim = steady(10.0);
    let id = sim.submit(vec![contract()])[0].id.clone();

    advance(100).await;
    sim.remove(&id);
    // Driver is asleep until t = 1s; it has not noticed yet.
    assert_eq!(sim.in_flight(), vec![id.clone()]);

    advance(1_000).await;
    assert!(sim.in_flight().is_empty());
    assert!(sim.get(&id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_removing_first_does_not_affect_second() {
    let sim = steady(10.0);
    let created = sim.submit(vec![contract(), RawFile::new("lease.docx", 4096, "")]);
    let (first, second) = (created[0].id.clone(), created[1].id.clone());

    advance(1_500).await;
    sim.remove(&first);

    advance(9_000).await;
    let listed = sim.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, second);
    assert_eq!(listed[0].status, UploadStatus::Completed);
    assert_eq!(listed[0].progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_completed_records_are_not_auto_removed() {
    let sim = steady(50.0);
    sim.submit(vec![contract()]);
    advance(5_000).await;
    assert_eq!(sim.counts().completed, 1);
    assert_eq!(sim.list().len(), 1);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_event_sequence_for_one_record() {
    let sim = steady(40.0);
    let mut rx = sim.subscribe();
    let id = sim.submit(vec![contract()])[0].id.clone();

    let mut kinds = Vec::new();
    loop {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.file_id(), id);
        kinds.push(event.kind().to_string());
        if event.kind() == "completed" {
            break;
        }
    }
    assert_eq!(kinds, ["submitted", "progress", "progress", "completed"]);

    sim.remove(&id);
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind(), "removed");
    assert!(event.file().is_none());

    sim.remove(&id);
    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Shutdown and logging
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_drivers() {
    let sim = steady(10.0);
    sim.submit(vec![contract(), contract()]);
    advance(100).await;
    assert_eq!(sim.in_flight().len(), 2);

    sim.shutdown();
    assert!(sim.in_flight().is_empty());

    let before = sim.list();
    advance(20_000).await;
    assert_eq!(sim.list(), before);
    assert!(before.iter().all(|f| f.progress == 10.0));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_lifecycle_is_logged() {
    let sim = steady(60.0);
    let id = sim.submit(vec![contract()])[0].id.clone();
    advance(2_000).await;
    sim.remove(&id);

    assert!(logs_contain("submitted: contract.pdf"));
    assert!(logs_contain("completed: contract.pdf"));
    assert!(logs_contain("removed: contract.pdf"));
}
