use kml::types::{AltitudeMode, Coord, Geometry, LineString, Placemark};
use kml::{Kml, KmlDocument, KmlWriter};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::{Position, Sample};

/// Half-width in degrees of the weather model area around the launch site.
const MODEL_MARGIN_DEG: f64 = 1.5;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("weather model unavailable: {0}")]
    Model(String),
    #[error("prediction failed: {0}")]
    Prediction(String),
    #[error("failed to render KML: {0}")]
    Render(#[from] kml::Error),
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BalloonConfig {
    pub altitude_step: f64,
    pub equip_mass: f64,
    pub balloon_mass: f64,
    pub fill_radius: f64,
    pub radius_empty: f64,
    pub burst_radius: f64,
    pub thickness_empty: f64,
    pub cd_balloon: f64,
    pub cd_parachute: f64,
    /// Parachute areas in m², in deployment order.
    pub parachute_areas: Vec<f64>,
    pub parachute_change_altitude: f64,
}

impl Default for BalloonConfig {
    fn default() -> Self {
        Self {
            altitude_step: 100.0,
            equip_mass: 1.0,
            balloon_mass: 1.0,
            fill_radius: 1.0,
            radius_empty: 0.5,
            burst_radius: 3.0,
            thickness_empty: 0.2,
            cd_balloon: 0.5,
            cd_parachute: 0.8,
            parachute_areas: [0.5_f64, 1.5]
                .iter()
                .map(|r| std::f64::consts::PI * r * r)
                .collect(),
            parachute_change_altitude: 2000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelArea {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl ModelArea {
    pub fn around(launch: &Position) -> Self {
        Self {
            north: launch.latitude + MODEL_MARGIN_DEG,
            west: launch.longitude - MODEL_MARGIN_DEG,
            south: launch.latitude - MODEL_MARGIN_DEG,
            east: launch.longitude + MODEL_MARGIN_DEG,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrajectoryRequest<'a> {
    pub balloon: &'a BalloonConfig,
    pub launch: Position,
    pub model_dir: &'a Path,
    pub model_area: ModelArea,
    /// `None` for the initial prediction before any telemetry arrived.
    pub live: Option<&'a [Sample]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub elapsed_seconds: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub name: String,
    pub points: Vec<PathPoint>,
}

pub trait TrajectoryEngine: Send + Sync {
    fn predict(&self, request: &TrajectoryRequest<'_>) -> Result<Vec<Trajectory>, TrajectoryError>;
}

/// Replaces `path` with a KML document holding one line string per trajectory.
pub fn write_kml(path: &Path, trajectories: &[Trajectory]) -> Result<(), TrajectoryError> {
    let output_err = |source| TrajectoryError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    KmlWriter::from_writer(&mut buf).write(&document(trajectories))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, buf).map_err(output_err)?;
    std::fs::rename(&tmp, path).map_err(output_err)
}

fn document(trajectories: &[Trajectory]) -> Kml {
    let placemarks = trajectories
        .iter()
        .map(|trajectory| {
            Kml::Placemark(Placemark {
                name: Some(trajectory.name.clone()),
                geometry: Some(Geometry::LineString(LineString {
                    coords: trajectory
                        .points
                        .iter()
                        .map(|p| Coord::new(p.longitude, p.latitude, Some(p.altitude_m)))
                        .collect(),
                    altitude_mode: AltitudeMode::Absolute,
                    ..Default::default()
                })),
                ..Default::default()
            })
        })
        .collect();

    Kml::KmlDocument(KmlDocument {
        elements: placemarks,
        ..Default::default()
    })
}
