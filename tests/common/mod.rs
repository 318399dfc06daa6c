#![allow(dead_code)]

use balloon_tracker::config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Frames for the two-sample ascent scenario: TEST-1 at 1000 s and 1010 s,
/// same position, 328 ft then 492 ft.
pub const ASCENT_FRAMES: &str = "\
TEST-1>APRS,WIDE2-1:/001640h6000.00N/02500.00EO/A=000328
OTHER-9>APRS,WIDE2-1:/001645h6100.00N/02600.00EO/A=009999
TEST-1>APRS,WIDE2-1:>status only
not a frame at all
TEST-1>APRS,WIDE2-1:/001650h6000.00N/02500.00EO/A=000492
";

pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Replay config for `aprs_file` with sinks inside the fixture directory.
    pub fn replay_config(&self, aprs_file: &Path, interval: &str, extra: &str) -> Config {
        let yaml = format!(
            "source:\n  kind: file\n  aprs_file: {}\ncallsign: TEST-1\npoll_interval: {}\n\
             persistence:\n  raw_file: {}\n  data_file: {}\n{}",
            aprs_file.display(),
            interval,
            self.path("raw_data.dat").display(),
            self.path("live_data.dat").display(),
            extra
        );
        Config::from_str(&yaml).unwrap()
    }
}

/// Polls `cond` every 10 ms until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
