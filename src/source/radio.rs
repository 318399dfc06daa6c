use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::SourceError;
use crate::config::SdrConfig;

const TUNER: &str = "rtl_fm";
const DEMODULATOR: &str = "multimon-ng";

#[derive(Debug)]
pub struct RadioPipeline {
    tuner: Child,
    demodulator: Child,
    lines: Lines<BufReader<ChildStdout>>,
    ended: bool,
}

impl RadioPipeline {
    pub fn spawn(config: &SdrConfig) -> Result<Self, SourceError> {
        let frequency = config
            .frequency_hz()
            .ok_or_else(|| SourceError::Settings(format!("frequency '{}'", config.frequency)))?;

        let unavailable = |what: &str| {
            let what = what.to_string();
            move |source: io::Error| SourceError::Unavailable { what, source }
        };

        let mut tuner = Command::new(TUNER)
            .arg("-f")
            .arg(format!("{:.0}", frequency))
            .arg("-s")
            .arg(config.sample_rate.to_string())
            .arg("-g")
            .arg(config.gain.to_string())
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(unavailable(TUNER))?;

        log::info!(
            "Spawned {} at {:.0} Hz (PID: {:?})",
            TUNER,
            frequency,
            tuner.id()
        );

        let audio: Stdio = tuner
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("tuner stdout not captured"))
            .and_then(|out| out.try_into())
            .map_err(unavailable(TUNER))?;

        let mut demodulator = Command::new(DEMODULATOR)
            .args(["-t", "raw", "-a", "AFSK1200", "-A", "-"])
            .stdin(audio)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(unavailable(DEMODULATOR))?;

        log::info!("Spawned {} (PID: {:?})", DEMODULATOR, demodulator.id());

        let stdout = demodulator
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("demodulator stdout not captured"))
            .map_err(unavailable(DEMODULATOR))?;

        Ok(Self {
            tuner,
            demodulator,
            lines: BufReader::new(stdout).lines(),
            ended: false,
        })
    }

    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        if self.ended {
            return Ok(None);
        }
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(line)),
            None => {
                log::warn!("{} output ended; radio source is now idle", DEMODULATOR);
                self.ended = true;
                Ok(None)
            }
        }
    }

    pub async fn close(&mut self) {
        for (name, child) in [
            (DEMODULATOR, &mut self.demodulator),
            (TUNER, &mut self.tuner),
        ] {
            if let Err(e) = child.kill().await {
                log::debug!("Stopping {}: {}", name, e);
            }
        }
        self.ended = true;
    }
}
