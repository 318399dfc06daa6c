//! Live telemetry shared between the collector, the session supervisor and
//! whatever presents the data.
//!
//! One mutex guards both the sample series and the current GPS fix. It is only
//! held for the duration of a single [`LiveDataStore::accept`],
//! [`LiveDataStore::update_fix`] or read call.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::frame::{Fix, Packet};
use crate::geodesy;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("packet from {0} is not a location report")]
    NotLocation(String),
    #[error("replayed packet from {0} has no timestamp")]
    MissingTimestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed_seconds: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub temperature_c: f64,
    pub horizontal_speed_mps: f64,
    pub vertical_speed_mps: f64,
}

impl Sample {
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_m: self.altitude_m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timebase {
    /// Wall clock relative to the session start.
    Live { started: DateTime<Utc> },
    /// Embedded packet time relative to the first accepted packet.
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub len: usize,
    pub last: Option<Sample>,
    pub fix: Position,
}

#[derive(Debug)]
struct Shared {
    samples: Vec<Sample>,
    fix: Position,
    epoch: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct LiveDataStore {
    timebase: Timebase,
    shared: Arc<Mutex<Shared>>,
}

impl LiveDataStore {
    pub fn new(timebase: Timebase, launch: Position) -> Self {
        Self {
            timebase,
            shared: Arc::new(Mutex::new(Shared {
                samples: Vec::new(),
                fix: launch,
                epoch: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Critical sections never leave a partial sample behind.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// `received_at` is only used with [`Timebase::Live`].
    pub fn accept(&self, packet: &Packet, received_at: DateTime<Utc>) -> Result<Sample, StoreError> {
        if !packet.is_location() {
            return Err(StoreError::NotLocation(packet.source.clone()));
        }

        let mut locked = self.lock();

        let elapsed_seconds = match self.timebase {
            Timebase::Live { started } => seconds_between(started, received_at),
            Timebase::Replay => {
                let stamp = packet
                    .timestamp
                    .ok_or_else(|| StoreError::MissingTimestamp(packet.source.clone()))?;
                let epoch = *locked.epoch.get_or_insert(stamp);
                seconds_between(epoch, stamp)
            }
        };

        let mut sample = Sample {
            elapsed_seconds,
            latitude: packet.latitude,
            longitude: packet.longitude,
            altitude_m: packet.altitude_m.unwrap_or(0.0),
            temperature_c: packet.temperature_c.unwrap_or(0.0),
            horizontal_speed_mps: 0.0,
            vertical_speed_mps: 0.0,
        };

        if let Some(prev) = locked.samples.last() {
            let (horizontal, vertical) = speeds(prev, &sample);
            sample.horizontal_speed_mps = horizontal;
            sample.vertical_speed_mps = vertical;
        }

        locked.samples.push(sample);

        // The first sample has no interval of its own; it borrows the second one's.
        if locked.samples.len() == 2 {
            let first = &mut locked.samples[0];
            first.horizontal_speed_mps = sample.horizontal_speed_mps;
            first.vertical_speed_mps = sample.vertical_speed_mps;
        }

        Ok(sample)
    }

    pub fn update_fix(&self, fix: &Fix) -> bool {
        if !fix.is_valid() {
            return false;
        }
        self.lock().fix = Position {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude_m: fix.altitude_m,
        };
        true
    }

    pub fn snapshot(&self) -> Snapshot {
        let locked = self.lock();
        Snapshot {
            len: locked.samples.len(),
            last: locked.samples.last().copied(),
            fix: locked.fix,
        }
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.lock().samples.clone()
    }

    pub fn current_fix(&self) -> Position {
        self.lock().fix
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Horizontal and vertical speed in m/s over the interval `prev -> next`.
/// A non-positive interval gives zero for both.
fn speeds(prev: &Sample, next: &Sample) -> (f64, f64) {
    let dt = next.elapsed_seconds - prev.elapsed_seconds;
    if dt <= 0.0 {
        return (0.0, 0.0);
    }

    let metres = geodesy::distance(prev.latitude, prev.longitude, next.latitude, next.longitude) * 1000.0;
    (metres / dt, (next.altitude_m - prev.altitude_m) / dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PacketKind;
    use chrono::Duration;
    use std::thread;

    const LAUNCH: Position = Position {
        latitude: 60.1,
        longitude: 25.0,
        altitude_m: 10.0,
    };

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn packet(t: i64, lat: f64, lon: f64, alt: f64) -> Packet {
        Packet {
            source: "TEST-1".into(),
            destination: "APRS".into(),
            path: Vec::new(),
            kind: PacketKind::Location,
            latitude: lat,
            longitude: lon,
            altitude_m: Some(alt),
            timestamp: Some(epoch() + Duration::seconds(t)),
            temperature_c: None,
            comment: String::new(),
        }
    }

    fn replay_store() -> LiveDataStore {
        LiveDataStore::new(Timebase::Replay, LAUNCH)
    }

    #[test]
    fn first_sample_has_placeholder_speeds() {
        let store = replay_store();
        let sample = store.accept(&packet(1000, 60.0, 25.0, 100.0), Utc::now()).unwrap();
        assert_eq!(sample.elapsed_seconds, 0.0);
        assert_eq!(sample.horizontal_speed_mps, 0.0);
        assert_eq!(sample.vertical_speed_mps, 0.0);
    }

    #[test]
    fn second_sample_backfills_first() {
        let store = replay_store();
        store.accept(&packet(0, 60.0, 25.0, 100.0), Utc::now()).unwrap();
        store.accept(&packet(10, 60.01, 25.0, 180.0), Utc::now()).unwrap();

        let samples = store.samples();
        assert_eq!(samples[1].vertical_speed_mps, 8.0);
        assert!((samples[1].horizontal_speed_mps - 111.19).abs() < 0.1);
        assert_eq!(samples[0].horizontal_speed_mps, samples[1].horizontal_speed_mps);
        assert_eq!(samples[0].vertical_speed_mps, samples[1].vertical_speed_mps);
    }

    #[test]
    fn third_sample_uses_only_previous_interval() {
        let store = replay_store();
        store.accept(&packet(0, 60.0, 25.0, 100.0), Utc::now()).unwrap();
        store.accept(&packet(10, 60.0, 25.0, 900.0), Utc::now()).unwrap();
        store.accept(&packet(20, 60.0, 25.0, 950.0), Utc::now()).unwrap();

        let samples = store.samples();
        assert_eq!(samples[2].vertical_speed_mps, 5.0);
        // Backfill happened once, on the second accept only.
        assert_eq!(samples[0].vertical_speed_mps, 80.0);
    }

    #[test]
    fn non_increasing_time_gives_zero_speed() {
        let store = replay_store();
        store.accept(&packet(10, 60.0, 25.0, 100.0), Utc::now()).unwrap();
        store.accept(&packet(10, 60.1, 25.0, 200.0), Utc::now()).unwrap();
        store.accept(&packet(5, 60.2, 25.0, 300.0), Utc::now()).unwrap();

        let samples = store.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].elapsed_seconds, -5.0);
        for sample in samples {
            assert_eq!(sample.horizontal_speed_mps, 0.0);
            assert_eq!(sample.vertical_speed_mps, 0.0);
        }
    }

    #[test]
    fn live_time_is_relative_to_session_start() {
        let started = epoch();
        let store = LiveDataStore::new(Timebase::Live { started }, LAUNCH);
        let mut p = packet(0, 60.0, 25.0, 100.0);
        p.timestamp = None;

        let sample = store.accept(&p, started + Duration::milliseconds(2500)).unwrap();
        assert_eq!(sample.elapsed_seconds, 2.5);
    }

    #[test]
    fn replay_rejects_packets_without_time() {
        let store = replay_store();
        let mut p = packet(0, 60.0, 25.0, 100.0);
        p.timestamp = None;
        assert_eq!(
            store.accept(&p, Utc::now()),
            Err(StoreError::MissingTimestamp("TEST-1".into()))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_non_location_packets() {
        let store = replay_store();
        let mut p = packet(0, 60.0, 25.0, 100.0);
        p.kind = PacketKind::Other;
        assert!(matches!(store.accept(&p, Utc::now()), Err(StoreError::NotLocation(_))));
    }

    #[test]
    fn missing_temperature_and_altitude_default_to_zero() {
        let store = replay_store();
        let mut p = packet(0, 60.0, 25.0, 100.0);
        p.altitude_m = None;
        let sample = store.accept(&p, Utc::now()).unwrap();
        assert_eq!(sample.altitude_m, 0.0);
        assert_eq!(sample.temperature_c, 0.0);
    }

    #[test]
    fn invalid_fix_is_ignored() {
        let store = replay_store();
        let fix = Fix {
            quality: 0,
            latitude: 1.0,
            longitude: 2.0,
            altitude_m: 3.0,
        };
        assert!(!store.update_fix(&fix));
        assert_eq!(store.current_fix(), LAUNCH);

        let fix = Fix { quality: 1, ..fix };
        assert!(store.update_fix(&fix));
        assert_eq!(
            store.current_fix(),
            Position {
                latitude: 1.0,
                longitude: 2.0,
                altitude_m: 3.0
            }
        );
    }

    #[test]
    fn concurrent_accepts_are_not_lost() {
        let store = LiveDataStore::new(Timebase::Live { started: epoch() }, LAUNCH);
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let mut p = packet(0, 60.0, 25.0, (worker * 1000 + i) as f64);
                        p.timestamp = None;
                        store.accept(&p, epoch() + Duration::seconds(i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut altitudes: Vec<i64> = store.samples().iter().map(|s| s.altitude_m as i64).collect();
        assert_eq!(altitudes.len(), 400);
        altitudes.sort_unstable();
        altitudes.dedup();
        assert_eq!(altitudes.len(), 400);
    }

    #[test]
    fn snapshot_reports_growth() {
        let store = replay_store();
        assert_eq!(store.snapshot().len, 0);
        assert!(store.snapshot().last.is_none());
        store.accept(&packet(0, 60.0, 25.0, 100.0), Utc::now()).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len, 1);
        assert_eq!(snapshot.last.unwrap().altitude_m, 100.0);
        assert_eq!(snapshot.fix, LAUNCH);
    }
}
