mod collector;
mod controller;
mod error;

pub use collector::{Collector, CollectorState, Decoders};
pub use controller::{NotifyHook, Session};
pub use error::{CollectorError, SessionError};
