//! Line sources for the primary APRS channel and the optional GPS channel.
//!
//! A [`SourceReader`] never reconnects. Once its backend is gone it keeps
//! reporting "no data" until it is closed and a new one is opened.

mod radio;
mod replay;
mod serial;

use std::io;
use thiserror::Error;

use crate::config::{SerialConfig, SourceConfig};

pub use radio::RadioPipeline;
pub use replay::FileReplay;
pub use serial::SerialLines;

/// Prefix multimon-ng puts in front of every decoded frame.
const DEMODULATOR_PREFIX: &str = "APRS: ";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{what} unavailable: {source}")]
    Unavailable {
        what: String,
        #[source]
        source: io::Error,
    },
    #[error("serial port {port} unavailable: {source}")]
    Serial {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("invalid source settings: {0}")]
    Settings(String),
    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub enum SourceReader {
    Radio(RadioPipeline),
    Serial(SerialLines),
    Replay(FileReplay),
    /// Stands in for a backend that could not be opened or has been closed.
    Idle,
}

impl SourceReader {
    pub async fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        match config {
            SourceConfig::Sdr(sdr) => RadioPipeline::spawn(sdr).map(SourceReader::Radio),
            SourceConfig::Serial(serial) => Self::open_serial(serial),
            SourceConfig::File { aprs_file } => {
                FileReplay::open(aprs_file).await.map(SourceReader::Replay)
            }
        }
    }

    pub fn open_serial(config: &SerialConfig) -> Result<Self, SourceError> {
        SerialLines::open(config).map(SourceReader::Serial)
    }

    pub async fn read_line(&mut self) -> Result<Option<String>, SourceError> {
        let line = match self {
            SourceReader::Radio(radio) => radio.read_line().await?,
            SourceReader::Serial(serial) => serial.read_line().await?,
            SourceReader::Replay(replay) => replay.read_line().await?,
            SourceReader::Idle => None,
        };
        Ok(line.and_then(|l| clean_line(&l)))
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            SourceReader::Replay(replay) => replay.is_exhausted(),
            _ => false,
        }
    }

    pub async fn close(&mut self) {
        match std::mem::replace(self, SourceReader::Idle) {
            SourceReader::Radio(mut radio) => radio.close().await,
            SourceReader::Serial(mut serial) => serial.close(),
            SourceReader::Replay(_) | SourceReader::Idle => {}
        }
    }
}

fn clean_line(line: &str) -> Option<String> {
    let line = line.trim();
    let line = line.strip_prefix(DEMODULATOR_PREFIX).unwrap_or(line).trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_whitespace() {
        assert_eq!(
            clean_line("APRS: TEST-1>APRS:!6000.00N/02500.00EO\r\n").as_deref(),
            Some("TEST-1>APRS:!6000.00N/02500.00EO")
        );
        assert_eq!(clean_line("  $GPGGA,1  ").as_deref(), Some("$GPGGA,1"));
        assert_eq!(clean_line("\r\n"), None);
        assert_eq!(clean_line("APRS: "), None);
    }

    #[tokio::test]
    async fn idle_reader_has_no_data() {
        let mut reader = SourceReader::Idle;
        assert!(reader.read_line().await.unwrap().is_none());
        reader.close().await;
        reader.close().await;
        assert!(!reader.is_exhausted());
    }

    #[tokio::test]
    async fn missing_replay_file_is_unavailable() {
        let config = SourceConfig::File {
            aprs_file: "/nonexistent/frames.log".into(),
        };
        let err = SourceReader::open(&config).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn missing_serial_port_is_unavailable() {
        let config: SerialConfig = serde_yaml::from_str("port: /dev/does-not-exist-0").unwrap();
        let err = SourceReader::open_serial(&config).unwrap_err();
        assert!(matches!(err, SourceError::Serial { .. }));
    }
}
