//! Boundary between raw text lines and structured records.
//!
//! The collector only depends on the [`PacketDecoder`] and [`FixDecoder`]
//! traits. [`Tnc2Decoder`] and [`GgaDecoder`] are the implementations used by
//! the binary.

mod aprs;
mod error;
mod nmea;
mod types;

pub use aprs::Tnc2Decoder;
pub use error::DecodeError;
pub use nmea::GgaDecoder;
pub use types::{Fix, Packet, PacketKind};

pub trait PacketDecoder: Send + Sync {
    fn decode(&self, line: &str) -> Result<Packet, DecodeError>;
}

pub trait FixDecoder: Send + Sync {
    fn decode(&self, line: &str) -> Result<Fix, DecodeError>;
}
