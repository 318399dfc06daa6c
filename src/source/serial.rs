use serialport::{DataBits, FlowControl, Parity as PortParity, SerialPort, StopBits};
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use super::SourceError;
use crate::config::{Parity, SerialConfig};

/// Used when no read timeout is configured; bounds how long close() waits on the reader thread.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const BACKLOG: usize = 64;

/// Serial port read on a dedicated thread. Lines arrive through a channel.
#[derive(Debug)]
pub struct SerialLines {
    port: String,
    rx: mpsc::Receiver<io::Result<String>>,
    stop: Arc<AtomicBool>,
}

impl SerialLines {
    pub fn open(config: &SerialConfig) -> Result<Self, SourceError> {
        let data_bits = match config.bytesize {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => return Err(SourceError::Settings(format!("bytesize {}", other))),
        };
        let stop_bits = match config.stopbits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => return Err(SourceError::Settings(format!("stopbits {}", other))),
        };
        let parity = match config.parity {
            Parity::None => PortParity::None,
            Parity::Even => PortParity::Even,
            Parity::Odd => PortParity::Odd,
        };
        let flow_control = if config.rtscts {
            FlowControl::Hardware
        } else if config.xonxoff {
            FlowControl::Software
        } else {
            FlowControl::None
        };

        if config.dsrdtr {
            log::warn!("{}: DSR/DTR flow control is not supported, ignoring", config.port);
        }
        if config.write_timeout.is_some() {
            log::debug!("{}: write_timeout has no effect on a read-only port", config.port);
        }

        let port = serialport::new(&config.port, config.baud)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(
                config
                    .read_timeout
                    .or(config.inter_char_timeout)
                    .unwrap_or(DEFAULT_TIMEOUT),
            )
            .open()
            .map_err(|source| SourceError::Serial {
                port: config.port.clone(),
                source,
            })?;

        log::info!("Opened serial port {} at {} baud", config.port, config.baud);

        let (tx, rx) = mpsc::channel(BACKLOG);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let name = config.port.clone();

        thread::Builder::new()
            .name(format!("serial {}", config.port))
            .spawn(move || read_lines(port, tx, thread_stop, name))
            .map_err(|source| SourceError::Unavailable {
                what: format!("reader thread for {}", config.port),
                source,
            })?;

        Ok(Self {
            port: config.port.clone(),
            rx,
            stop,
        })
    }

    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.rx.recv().await {
            Some(line) => line.map(Some),
            None => Ok(None),
        }
    }

    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.rx.close();
        log::info!("Closed serial port {}", self.port);
    }
}

fn read_lines(
    port: Box<dyn SerialPort>,
    tx: mpsc::Sender<io::Result<String>>,
    stop: Arc<AtomicBool>,
    name: String,
) {
    let mut reader = BufReader::new(port);
    // Survives timeouts so a line split across reads is kept whole.
    let mut buf = Vec::new();

    while !stop.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();
                if tx.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("Serial port {} failed: {}", name, e);
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }

    log::debug!("Serial reader for {} exited", name);
}
