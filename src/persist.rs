use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::Sample;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only text file, one record per line, flushed after every record.
#[derive(Debug)]
pub struct LineSink {
    path: PathBuf,
    file: File,
}

impl LineSink {
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PersistError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &str) -> Result<(), PersistError> {
        writeln!(self.file, "{}", record)
            .and_then(|_| self.file.flush())
            .map_err(|source| PersistError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[derive(Debug, Default)]
pub struct Persistence {
    raw: Option<LineSink>,
    samples: Option<LineSink>,
}

impl Persistence {
    pub fn open(raw_file: Option<&Path>, data_file: Option<&Path>) -> Self {
        let open = |path: Option<&Path>, what: &str| {
            match LineSink::open(path?) {
                Ok(sink) => {
                    log::info!("Writing {} to {}", what, sink.path().display());
                    Some(sink)
                }
                Err(e) => {
                    log::error!("Continuing without {}: {}", what, e);
                    None
                }
            }
        };

        Self {
            raw: open(raw_file, "raw frames"),
            samples: open(data_file, "parsed samples"),
        }
    }

    /// Records one accepted frame. Write failures are logged, never returned.
    pub fn record(&mut self, raw_line: &str, sample: &Sample) {
        if let Some(sink) = self.raw.as_mut() {
            if let Err(e) = sink.append(raw_line) {
                log::error!("{}", e);
            }
        }
        if let Some(sink) = self.samples.as_mut() {
            if let Err(e) = sink.append(&format_sample(sample)) {
                log::error!("{}", e);
            }
        }
    }

    pub fn close(&mut self) {
        self.raw = None;
        self.samples = None;
    }
}

/// `elapsed_seconds,latitude,longitude,altitude_m`
pub fn format_sample(sample: &Sample) -> String {
    format!(
        "{},{},{},{}",
        sample.elapsed_seconds, sample.latitude, sample.longitude, sample.altitude_m
    )
}
