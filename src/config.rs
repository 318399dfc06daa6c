use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::store::Position;
use crate::trajectory::BalloonConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Session configuration, loaded once and read-only while a session runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default = "default_poll_interval", deserialize_with = "duration")]
    pub poll_interval: Duration,
    pub callsign: String,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default = "default_launch")]
    pub launch: Position,
    #[serde(default)]
    pub balloon: BalloonConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Sdr(SdrConfig),
    Serial(SerialConfig),
    File { aprs_file: PathBuf },
}

impl SourceConfig {
    pub fn is_replay(&self) -> bool {
        matches!(self, SourceConfig::File { .. })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdrConfig {
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

impl SdrConfig {
    pub fn frequency_hz(&self) -> Option<f64> {
        parse_frequency_hz(&self.frequency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    #[serde(default, deserialize_with = "optional_duration")]
    pub read_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub write_timeout: Option<Duration>,
    #[serde(default)]
    pub xonxoff: bool,
    #[serde(default)]
    pub rtscts: bool,
    #[serde(default)]
    pub dsrdtr: bool,
    #[serde(default, deserialize_with = "optional_duration")]
    pub inter_char_timeout: Option<Duration>,
}

impl SerialConfig {
    fn validate(&self, channel: &str) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(format!("{}: {}", channel, msg)));

        if self.port.trim().is_empty() {
            return invalid("serial port is empty".into());
        }
        if self.baud == 0 {
            return invalid("baud rate must be positive".into());
        }
        if !(5..=8).contains(&self.bytesize) {
            return invalid(format!("unsupported bytesize {}", self.bytesize));
        }
        if self.stopbits != 1 && self.stopbits != 2 {
            return invalid(format!("unsupported stopbits {}", self.stopbits));
        }
        if self.xonxoff && self.rtscts {
            return invalid("xonxoff and rtscts are mutually exclusive".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GpsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub serial: Option<SerialConfig>,
}

impl GpsConfig {
    /// Serial settings of the GPS receiver, if the GPS channel is in use.
    pub fn active(&self) -> Option<&SerialConfig> {
        self.serial.as_ref().filter(|_| self.enabled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_raw_file")]
    pub raw_file: Option<PathBuf>,
    #[serde(default = "default_data_file")]
    pub data_file: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            raw_file: default_raw_file(),
            data_file: default_data_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_gfs_dir")]
    pub gfs_dir: PathBuf,
    #[serde(default = "default_trajectory_file")]
    pub trajectory_file: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            gfs_dir: default_gfs_dir(),
            trajectory_file: default_trajectory_file(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callsign.trim().is_empty() {
            return Err(ConfigError::Invalid("callsign is empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }

        match &self.source {
            SourceConfig::Sdr(sdr) => {
                if sdr.frequency_hz().is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "invalid SDR frequency '{}'",
                        sdr.frequency
                    )));
                }
                if sdr.sample_rate == 0 {
                    return Err(ConfigError::Invalid("SDR sample_rate must be positive".into()));
                }
            }
            SourceConfig::Serial(serial) => serial.validate("source")?,
            SourceConfig::File { aprs_file } => {
                if aprs_file.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("aprs_file is empty".into()));
                }
            }
        }

        if self.gps.enabled {
            match &self.gps.serial {
                Some(serial) => serial.validate("gps")?,
                None => {
                    return Err(ConfigError::Invalid(
                        "gps is enabled but has no serial settings".into(),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Parses `"144.8M"`, `"433925k"`, `"1.2G"` or a bare number of Hz.
pub fn parse_frequency_hz(value: &str) -> Option<f64> {
    let value = value.trim();
    let (number, scale) = match value.chars().last()? {
        'k' | 'K' => (&value[..value.len() - 1], 1e3),
        'M' => (&value[..value.len() - 1], 1e6),
        'G' | 'g' => (&value[..value.len() - 1], 1e9),
        _ => (value, 1.0),
    };
    let hz = number.trim().parse::<f64>().ok()? * scale;
    (hz.is_finite() && hz > 0.0).then_some(hz)
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|s| humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_launch() -> Position {
    Position {
        latitude: 60.1,
        longitude: 25.0,
        altitude_m: 10.0,
    }
}

fn default_frequency() -> String {
    "144.8M".to_string()
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_gain() -> f64 {
    4.0
}

fn default_baud() -> u32 {
    9600
}

fn default_bytesize() -> u8 {
    8
}

fn default_stopbits() -> u8 {
    1
}

fn default_raw_file() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/raw_data.dat"))
}

fn default_data_file() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/live_data.dat"))
}

fn default_gfs_dir() -> PathBuf {
    PathBuf::from("/tmp/gfs")
}

fn default_trajectory_file() -> PathBuf {
    PathBuf::from("/tmp/balloon_trajectories.kml")
}
