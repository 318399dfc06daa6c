use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::CollectorError;
use crate::config::Config;
use crate::frame::{FixDecoder, GgaDecoder, PacketDecoder, Tnc2Decoder};
use crate::persist::Persistence;
use crate::source::SourceReader;
use crate::store::LiveDataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CollectorState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Clone)]
pub struct Decoders {
    pub packets: Arc<dyn PacketDecoder>,
    pub fixes: Arc<dyn FixDecoder>,
}

impl Default for Decoders {
    fn default() -> Self {
        Self {
            packets: Arc::new(Tnc2Decoder::default()),
            fixes: Arc::new(GgaDecoder),
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Producer side of a session: reads the sources, keeps matching packets
/// and GPS fixes in the store, and persists what it accepted.
pub struct Collector {
    config: Arc<Config>,
    store: LiveDataStore,
    decoders: Decoders,
    state: CollectorState,
    exhausted: Arc<AtomicBool>,
    worker: Option<WorkerHandle>,
}

impl Collector {
    pub fn new(config: Arc<Config>, store: LiveDataStore, decoders: Decoders) -> Self {
        Self {
            config,
            store,
            decoders,
            state: CollectorState::Created,
            exhausted: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Set once a replay source has run out of frames.
    pub fn exhausted_flag(&self) -> Arc<AtomicBool> {
        self.exhausted.clone()
    }

    pub async fn start(&mut self) -> Result<(), CollectorError> {
        if self.state != CollectorState::Created {
            return Err(CollectorError::NotStartable(self.state));
        }

        let worker = CollectorWorker {
            config: self.config.clone(),
            store: self.store.clone(),
            decoders: self.decoders.clone(),
            exhausted: self.exhausted.clone(),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(worker.run(stop_rx));

        self.worker = Some(WorkerHandle { stop_tx, join });
        self.state = CollectorState::Running;
        Ok(())
    }

    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.state = CollectorState::Stopping;
        let _ = worker.stop_tx.send(());
        if let Err(e) = worker.join.await {
            log::error!("Collector worker failed: {}", e);
        }
        self.state = CollectorState::Stopped;
    }
}

struct CollectorWorker {
    config: Arc<Config>,
    store: LiveDataStore,
    decoders: Decoders,
    exhausted: Arc<AtomicBool>,
}

impl CollectorWorker {
    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        let opened = tokio::select! {
            _ = &mut stop_rx => {
                log::info!("Collector stopped before its source opened");
                return;
            }
            opened = SourceReader::open(&self.config.source) => opened,
        };
        let primary = open_or_idle("APRS source", opened);
        let gps = self
            .config
            .gps
            .active()
            .map(|serial| open_or_idle("GPS receiver", SourceReader::open_serial(serial)));
        let persistence = Persistence::open(
            self.config.persistence.raw_file.as_deref(),
            self.config.persistence.data_file.as_deref(),
        );

        self.collect(primary, gps, persistence, stop_rx).await;
    }

    async fn collect(
        &self,
        mut primary: SourceReader,
        mut gps: Option<SourceReader>,
        mut persistence: Persistence,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let interval = self.config.poll_interval;

        log::info!(
            "Collector started (callsign {}, interval {:?})",
            self.config.callsign,
            interval
        );

        loop {
            let line = tokio::select! {
                _ = &mut stop_rx => break,
                line = read_within(&mut primary, interval, "APRS source") => line,
            };
            if let Some(line) = line {
                self.handle_frame(&line, &mut persistence);
            }
            if primary.is_exhausted() {
                self.exhausted.store(true, Ordering::SeqCst);
            }

            if let Some(gps) = gps.as_mut() {
                let line = tokio::select! {
                    _ = &mut stop_rx => break,
                    line = read_within(gps, interval, "GPS receiver") => line,
                };
                if let Some(line) = line {
                    self.handle_fix(&line);
                }
            }

            tokio::select! {
                _ = &mut stop_rx => break,
                _ = sleep(interval) => {}
            }
        }

        primary.close().await;
        if let Some(mut gps) = gps {
            gps.close().await;
        }
        persistence.close();

        log::info!("Collector stopped");
    }

    fn handle_frame(&self, line: &str, persistence: &mut Persistence) {
        let packet = match self.decoders.packets.decode(line) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Discarding frame '{}': {}", line, e);
                return;
            }
        };

        if !packet.is_location() || packet.source != self.config.callsign {
            log::debug!("Ignoring {:?} frame from {}", packet.kind, packet.source);
            return;
        }

        match self.store.accept(&packet, Utc::now()) {
            Ok(sample) => {
                log::info!(
                    "Sample at {:.1}s: {:.5}, {:.5} @ {:.0} m (v {:.1} m/s, h {:.1} m/s)",
                    sample.elapsed_seconds,
                    sample.latitude,
                    sample.longitude,
                    sample.altitude_m,
                    sample.vertical_speed_mps,
                    sample.horizontal_speed_mps
                );
                persistence.record(line, &sample);
            }
            Err(e) => log::debug!("Discarding frame '{}': {}", line, e),
        }
    }

    fn handle_fix(&self, line: &str) {
        match self.decoders.fixes.decode(line) {
            Ok(fix) if self.store.update_fix(&fix) => {
                log::debug!(
                    "GPS fix {:.5}, {:.5} @ {:.0} m",
                    fix.latitude,
                    fix.longitude,
                    fix.altitude_m
                );
            }
            Ok(_) => log::debug!("GPS reports no fix"),
            Err(e) => log::debug!("Discarding GPS line '{}': {}", line, e),
        }
    }
}

fn open_or_idle<E: std::fmt::Display>(what: &str, opened: Result<SourceReader, E>) -> SourceReader {
    opened.unwrap_or_else(|e| {
        log::warn!("{} unavailable, collecting nothing from it: {}", what, e);
        SourceReader::Idle
    })
}

/// One read bounded by the poll interval. Errors count as no data.
async fn read_within(reader: &mut SourceReader, interval: Duration, what: &str) -> Option<String> {
    match timeout(interval, reader.read_line()).await {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            log::warn!("{} read failed: {}", what, e);
            None
        }
        Err(_) => None,
    }
}
