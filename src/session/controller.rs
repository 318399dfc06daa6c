use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{Collector, Decoders, SessionError};
use crate::config::Config;
use crate::store::{LiveDataStore, Sample, Timebase};
use crate::trajectory::{write_kml, ModelArea, TrajectoryEngine, TrajectoryError, TrajectoryRequest};

/// Called once per poll interval in which the store grew.
pub type NotifyHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

struct Running {
    store: LiveDataStore,
    exhausted: Arc<AtomicBool>,
    worker: WorkerHandle,
}

/// Owns one collector per run, watches the store for growth and triggers
/// trajectory recomputation and the notify hook.
pub struct Session {
    config: Arc<Config>,
    decoders: Decoders,
    engine: Option<Arc<dyn TrajectoryEngine>>,
    notify: Option<NotifyHook>,
    running: Option<Running>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            decoders: Decoders::default(),
            engine: None,
            notify: None,
            running: None,
        }
    }

    pub fn with_decoders(mut self, decoders: Decoders) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn TrajectoryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_notify(mut self, notify: NotifyHook) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    pub fn store(&self) -> Option<&LiveDataStore> {
        self.running.as_ref().map(|r| &r.store)
    }

    pub fn source_exhausted(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.exhausted.load(Ordering::SeqCst))
    }

    pub async fn start(&mut self) -> Result<LiveDataStore, SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let timebase = if self.config.source.is_replay() {
            Timebase::Replay
        } else {
            Timebase::Live {
                started: Utc::now(),
            }
        };
        let store = LiveDataStore::new(timebase, self.config.launch);

        let mut collector = Collector::new(self.config.clone(), store.clone(), self.decoders.clone());
        collector.start().await?;
        let exhausted = collector.exhausted_flag();

        let supervisor = Supervisor {
            config: self.config.clone(),
            store: store.clone(),
            engine: self.engine.clone(),
            notify: self.notify.clone(),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(supervisor.run(collector, stop_rx));

        log::info!("Session started");

        self.running = Some(Running {
            store: store.clone(),
            exhausted,
            worker: WorkerHandle { stop_tx, join },
        });
        Ok(store)
    }

    pub async fn stop(&mut self) -> Option<LiveDataStore> {
        let running = self.running.take()?;

        let _ = running.worker.stop_tx.send(());
        if let Err(e) = running.worker.join.await {
            log::error!("Session supervisor failed: {}", e);
        }

        log::info!("Session stopped with {} samples", running.store.len());
        Some(running.store)
    }
}

struct Supervisor {
    config: Arc<Config>,
    store: LiveDataStore,
    engine: Option<Arc<dyn TrajectoryEngine>>,
    notify: Option<NotifyHook>,
}

impl Supervisor {
    async fn run(self, mut collector: Collector, mut stop_rx: oneshot::Receiver<()>) {
        let simulate = self.config.simulation.simulate;
        if simulate {
            if self.engine.is_some() {
                self.recompute(None).await;
            } else {
                log::warn!("Simulation requested but no trajectory engine is available");
            }
        }

        let mut seen = 0;
        loop {
            let snapshot = self.store.snapshot();
            if snapshot.len > seen {
                seen = snapshot.len;
                if simulate {
                    self.recompute(Some(self.store.samples())).await;
                }
                if let Some(notify) = &self.notify {
                    notify();
                }
            }

            tokio::select! {
                _ = &mut stop_rx => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        collector.stop().await;
    }

    /// Runs the engine off the async workers and rewrites the trajectory file.
    async fn recompute(&self, live: Option<Vec<Sample>>) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        let config = self.config.clone();

        let result = tokio::task::spawn_blocking(move || {
            let request = TrajectoryRequest {
                balloon: &config.balloon,
                launch: config.launch,
                model_dir: &config.simulation.gfs_dir,
                model_area: ModelArea::around(&config.launch),
                live: live.as_deref(),
            };
            let trajectories = engine.predict(&request)?;
            write_kml(&config.simulation.trajectory_file, &trajectories)?;
            Ok::<_, TrajectoryError>(trajectories.len())
        })
        .await;

        match result {
            Ok(Ok(count)) => log::info!(
                "Wrote {} trajectories to {}",
                count,
                self.config.simulation.trajectory_file.display()
            ),
            Ok(Err(e)) => log::error!("Trajectory update failed: {}", e),
            Err(e) => log::error!("Trajectory task failed: {}", e),
        }
    }
}
