//! Shutdown behaviour and trajectory recomputation.

mod common;

use balloon_tracker::session::Session;
use balloon_tracker::trajectory::{
    PathPoint, Trajectory, TrajectoryEngine, TrajectoryError, TrajectoryRequest,
};
use common::{wait_until, Fixture, ASCENT_FRAMES};
use std::io::Write;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn stop_does_not_wait_for_a_blocked_read() {
    let fixture = Fixture::new();
    let fifo = fixture.path("frames.fifo");
    let status = std::process::Command::new("mkfifo").arg(&fifo).status();
    if !status.is_ok_and(|s| s.success()) {
        eprintln!("mkfifo unavailable, skipping");
        return;
    }

    // Hold the write end open without writing so reads block.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let writer_path = fifo.clone();
    let writer = std::thread::spawn(move || {
        let mut file = std::fs::OpenOptions::new().write(true).open(writer_path).unwrap();
        let _ = release_rx.recv();
        let _ = file.flush();
    });

    let mut session = Session::new(fixture.replay_config(&fifo, "60s", ""));
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(5), session.stop()).await;
    assert!(stopped.is_ok(), "stop waited for the poll interval");

    // Unblock the reader thread so the runtime can shut down.
    release_tx.send(()).unwrap();
    writer.join().unwrap();
}

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<Option<usize>>>,
}

impl TrajectoryEngine for RecordingEngine {
    fn predict(&self, request: &TrajectoryRequest<'_>) -> Result<Vec<Trajectory>, TrajectoryError> {
        self.calls
            .lock()
            .unwrap()
            .push(request.live.map(|samples| samples.len()));

        let mut points = vec![PathPoint {
            elapsed_seconds: 0.0,
            latitude: request.launch.latitude,
            longitude: request.launch.longitude,
            altitude_m: request.launch.altitude_m,
        }];
        points.extend(request.live.unwrap_or_default().iter().map(|s| PathPoint {
            elapsed_seconds: s.elapsed_seconds,
            latitude: s.latitude,
            longitude: s.longitude,
            altitude_m: s.altitude_m,
        }));

        Ok(vec![Trajectory {
            name: "test model".into(),
            points,
        }])
    }
}

struct FailingEngine;

impl TrajectoryEngine for FailingEngine {
    fn predict(&self, _: &TrajectoryRequest<'_>) -> Result<Vec<Trajectory>, TrajectoryError> {
        Err(TrajectoryError::Model("no GFS files".into()))
    }
}

#[tokio::test]
async fn simulation_recomputes_on_growth() {
    let fixture = Fixture::new();
    let frames = fixture.write("f.log", ASCENT_FRAMES);
    let kml = fixture.path("paths.kml");
    let extra = format!(
        "simulation:\n  simulate: true\n  gfs_dir: {}\n  trajectory_file: {}\n",
        fixture.path("gfs").display(),
        kml.display()
    );

    let engine = Arc::new(RecordingEngine::default());
    let mut session = Session::new(fixture.replay_config(&frames, "20ms", &extra))
        .with_engine(engine.clone());

    session.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(10), || session.source_exhausted()).await);
    assert!(
        wait_until(Duration::from_secs(5), || {
            engine.calls.lock().unwrap().last() == Some(&Some(2))
        })
        .await
    );
    session.stop().await;

    let calls = engine.calls.lock().unwrap().clone();
    assert_eq!(calls.first(), Some(&None), "initial prediction has no live data");
    assert!(calls.len() <= 3);

    let written = std::fs::read_to_string(&kml).unwrap();
    assert_eq!(written.matches("<Placemark").count(), 1);
    assert!(written.contains("test model"));
}

#[tokio::test]
async fn failing_engine_does_not_stop_collection() {
    let fixture = Fixture::new();
    let frames = fixture.write("f.log", ASCENT_FRAMES);
    let extra = format!(
        "simulation:\n  simulate: true\n  trajectory_file: {}\n",
        fixture.path("paths.kml").display()
    );

    let mut session = Session::new(fixture.replay_config(&frames, "20ms", &extra))
        .with_engine(Arc::new(FailingEngine));

    session.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(10), || session.source_exhausted()).await);
    let store = session.stop().await.unwrap();

    assert_eq!(store.len(), 2);
    assert!(!fixture.path("paths.kml").exists());
}

#[tokio::test]
async fn simulation_without_engine_still_collects() {
    let fixture = Fixture::new();
    let frames = fixture.write("f.log", ASCENT_FRAMES);
    let mut session = Session::new(fixture.replay_config(
        &frames,
        "20ms",
        "simulation:\n  simulate: true\n",
    ));

    session.start().await.unwrap();
    assert!(wait_until(Duration::from_secs(10), || session.source_exhausted()).await);
    assert_eq!(session.stop().await.unwrap().len(), 2);
}
