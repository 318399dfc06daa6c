use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Location,
    Other,
}

/// A decoded APRS frame. Position fields are only meaningful for
/// [`PacketKind::Location`].
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
    pub kind: PacketKind,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature_c: Option<f64>,
    pub comment: String,
}

impl Packet {
    pub fn is_location(&self) -> bool {
        self.kind == PacketKind::Location
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub quality: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl Fix {
    pub fn is_valid(&self) -> bool {
        self.quality != 0
    }
}
