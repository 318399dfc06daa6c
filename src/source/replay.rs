use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use super::SourceError;

#[derive(Debug)]
pub struct FileReplay {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    exhausted: bool,
}

impl FileReplay {
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)
            .await
            .map_err(|source| SourceError::Unavailable {
                what: path.display().to_string(),
                source,
            })?;

        log::info!("Replaying frames from {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            exhausted: false,
        })
    }

    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }
        let line = self.lines.next_line().await?;
        if line.is_none() {
            log::info!("Replay of {} finished", self.path.display());
            self.exhausted = true;
        }
        Ok(line)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
