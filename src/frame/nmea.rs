use super::{DecodeError, Fix, FixDecoder};

/// Decoder for GGA sentences from any talker (`$GPGGA`, `$GNGGA`, ...).
#[derive(Debug, Clone, Default)]
pub struct GgaDecoder;

impl FixDecoder for GgaDecoder {
    fn decode(&self, line: &str) -> Result<Fix, DecodeError> {
        let line = line.trim();
        let body = line
            .strip_prefix('$')
            .ok_or_else(|| DecodeError::Malformed(format!("not an NMEA sentence: {}", line)))?;

        let body = match body.split_once('*') {
            Some((body, checksum)) => {
                verify_checksum(body, checksum)?;
                body
            }
            None => body,
        };

        let fields: Vec<&str> = body.split(',').collect();
        let sentence = fields[0];
        if sentence.len() != 5 || !sentence.ends_with("GGA") {
            return Err(DecodeError::UnsupportedSentence(sentence.to_string()));
        }
        if fields.len() < 10 {
            return Err(DecodeError::Malformed(format!("short GGA sentence: {}", line)));
        }

        let quality: u8 = match fields[6] {
            "" => 0,
            q => q
                .parse()
                .map_err(|_| DecodeError::Malformed(format!("fix quality '{}'", q)))?,
        };
        if quality == 0 {
            return Ok(Fix {
                quality,
                latitude: 0.0,
                longitude: 0.0,
                altitude_m: 0.0,
            });
        }

        let latitude = parse_coordinate(fields[2], fields[3], 2, 'N', 'S')?;
        let longitude = parse_coordinate(fields[4], fields[5], 3, 'E', 'W')?;
        let altitude_m = match fields[9] {
            "" => 0.0,
            a => a
                .parse()
                .map_err(|_| DecodeError::Malformed(format!("altitude '{}'", a)))?,
        };

        Ok(Fix {
            quality,
            latitude,
            longitude,
            altitude_m,
        })
    }
}

fn verify_checksum(body: &str, checksum: &str) -> Result<(), DecodeError> {
    let expected = u8::from_str_radix(checksum.trim(), 16)
        .map_err(|_| DecodeError::Malformed(format!("checksum '{}'", checksum)))?;
    let computed = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if expected != computed {
        return Err(DecodeError::Checksum { expected, computed });
    }
    Ok(())
}

fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    degree_digits: usize,
    positive: char,
    negative: char,
) -> Result<f64, DecodeError> {
    let bad = || DecodeError::InvalidCoordinate(format!("{},{}", value, hemisphere));

    let degrees: f64 = value
        .get(..degree_digits)
        .and_then(|d| d.parse().ok())
        .ok_or_else(bad)?;
    let minutes: f64 = value
        .get(degree_digits..)
        .and_then(|m| m.parse().ok())
        .ok_or_else(bad)?;

    let magnitude = degrees + minutes / 60.0;
    match hemisphere.chars().next() {
        Some(h) if h == positive => Ok(magnitude),
        Some(h) if h == negative => Ok(-magnitude),
        _ => Err(bad()),
    }
}
