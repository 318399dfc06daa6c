use thiserror::Error;

use super::CollectorState;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector cannot start from state {0}")]
    NotStartable(CollectorState),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already running")]
    AlreadyRunning,
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),
}
