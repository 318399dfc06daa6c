use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use ogn_parser::{AprsData, AprsPacket, AprsPosition, Timestamp};
use std::sync::Mutex;

use super::{DecodeError, Packet, PacketDecoder, PacketKind};

const FEET_TO_M: f64 = 0.3048;
const WEATHER_SYMBOL: char = '_';
const UNCOMPRESSED_LEN: usize = 19;
const COMPRESSED_LEN: usize = 13;

/// Decoder for TNC2 text frames (`SRC>DEST,PATH:info`).
///
/// APRS timestamps carry no year, and `HHMMSSh` no date at all. Each stamp is
/// placed at the latest date that is not more than 12 h after the previous
/// stamp this decoder saw (initially the time of construction).
#[derive(Debug)]
pub struct Tnc2Decoder {
    anchor: Mutex<DateTime<Utc>>,
}

impl Default for Tnc2Decoder {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Tnc2Decoder {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor: Mutex::new(anchor),
        }
    }

    fn resolve(&self, stamp: &Timestamp) -> Result<Option<DateTime<Utc>>, DecodeError> {
        let mut anchor = self.anchor.lock().unwrap_or_else(|e| e.into_inner());
        let limit = *anchor + Duration::hours(12);

        let resolved = match *stamp {
            Timestamp::HHMMSS(h, m, s) => {
                let time = NaiveTime::from_hms_opt(h.into(), m.into(), s.into())
                    .ok_or_else(|| invalid_stamp(stamp))?;
                latest_day_with(limit, time)
            }
            Timestamp::DDHHMM(d, h, m) => {
                let time = NaiveTime::from_hms_opt(h.into(), m.into(), 0)
                    .ok_or_else(|| invalid_stamp(stamp))?;
                latest_month_with(limit, d.into(), time).ok_or_else(|| invalid_stamp(stamp))?
            }
            // Local-time stamps cannot be placed on the UTC timeline.
            _ => return Ok(None),
        };

        *anchor = resolved;
        Ok(Some(resolved))
    }
}

impl PacketDecoder for Tnc2Decoder {
    fn decode(&self, line: &str) -> Result<Packet, DecodeError> {
        let line = line.trim();
        let parsed: AprsPacket = line
            .parse()
            .map_err(|e| DecodeError::Malformed(format!("{}", e)))?;

        let mut packet = Packet {
            source: parsed.from.to_string(),
            destination: parsed.to.to_string(),
            path: parsed.via.iter().map(|hop| hop.to_string()).collect(),
            kind: PacketKind::Other,
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: None,
            timestamp: None,
            temperature_c: None,
            comment: String::new(),
        };

        let AprsData::Position(position) = &parsed.data else {
            packet.comment = info(line).to_string();
            return Ok(packet);
        };

        let comment = raw_comment(line, position);
        packet.kind = PacketKind::Location;
        packet.latitude = degrees(&position.latitude);
        packet.longitude = degrees(&position.longitude);
        packet.altitude_m = position
            .comment
            .altitude
            .map(|feet| feet as f64 * FEET_TO_M)
            .or_else(|| altitude_in(comment));
        if position.symbol_code == WEATHER_SYMBOL {
            packet.temperature_c = temperature_in(comment);
        }
        packet.timestamp = match &position.timestamp {
            Some(stamp) => self.resolve(stamp)?,
            None => None,
        };
        packet.comment = comment.to_string();

        Ok(packet)
    }
}

fn invalid_stamp(stamp: &Timestamp) -> DecodeError {
    DecodeError::InvalidTimestamp(format!("{:?}", stamp))
}

fn degrees(value: &f64) -> f64 {
    *value
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

fn latest_day_with(limit: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let candidate = at(limit.date_naive(), time);
    if candidate > limit {
        candidate - Duration::days(1)
    } else {
        candidate
    }
}

/// Walks back from the month of `limit` to the latest month where `day` exists
/// and the stamp is not after `limit`.
fn latest_month_with(limit: DateTime<Utc>, day: u32, time: NaiveTime) -> Option<DateTime<Utc>> {
    let first = limit.date_naive().with_day(1)?;
    (0..=12)
        .filter_map(|back| first.checked_sub_months(Months::new(back))?.with_day(day))
        .map(|date| at(date, time))
        .find(|candidate| *candidate <= limit)
}

fn info(line: &str) -> &str {
    line.split_once(':').map_or("", |(_, info)| info)
}

fn raw_comment<'a>(line: &'a str, position: &AprsPosition) -> &'a str {
    let info = info(line);
    let mut offset = 1;
    if position.timestamp.is_some() {
        offset += 7;
    }
    let body = info.get(offset..).unwrap_or("");
    let position_len = if body.starts_with(|c: char| c.is_ascii_digit()) {
        UNCOMPRESSED_LEN
    } else {
        COMPRESSED_LEN
    };
    body.get(position_len..).unwrap_or("")
}

fn altitude_in(comment: &str) -> Option<f64> {
    let idx = comment.find("/A=")?;
    let feet: f64 = comment.get(idx + 3..idx + 9)?.parse().ok()?;
    Some(feet * FEET_TO_M)
}

// Weather reports carry temperature as `tNNN` in Fahrenheit after the wind fields.
fn temperature_in(comment: &str) -> Option<f64> {
    let rest = comment.get(7..)?;
    let idx = rest.find('t')?;
    let fahrenheit: f64 = rest.get(idx + 1..idx + 4)?.trim().parse().ok()?;
    Some((fahrenheit - 32.0) * 5.0 / 9.0)
}
