//! Temporal codec
//!
//! Servers emit timestamps in whichever layout their configuration selects:
//! a bare date, a bare time, RFC 3339, or a space-separated timestamp whose
//! offset is written as `±HH:MM:SS`, `±HH:MM`, `±HH` or left out entirely.
//! The layout is detected from the byte positions alone, and output is always
//! the canonical UTC form `YYYY-MM-DD HH:MM:SS[.fffffffff]+00:00:00`.

use super::{ColumnValue, Result};
use crate::core::RelbindError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Length of the longest time-only layout, `15:04:05.999999999`.
const MAX_TIME_LEN: usize = 18;

/// Parses raw column bytes into a UTC timestamp.
pub fn parse_time(b: &[u8]) -> Result<DateTime<Utc>> {
    let s = std::str::from_utf8(b)
        .map_err(|_| RelbindError::MalformedTemporalValue(String::from_utf8_lossy(b).into_owned()))?;
    parse_time_str(s)
}

/// Parses any of the supported textual layouts into a UTC timestamp.
///
/// Time-only values land on `0000-01-01`.
pub fn parse_time_str(s: &str) -> Result<DateTime<Utc>> {
    let malformed = || RelbindError::MalformedTemporalValue(s.to_string());
    let bytes = s.as_bytes();
    let l = bytes.len();

    if l <= MAX_TIME_LEN {
        if l < 3 {
            return Err(malformed());
        }
        if bytes[2] == b':' {
            let time = NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|_| malformed())?;
            let epoch = NaiveDate::from_ymd_opt(0, 1, 1).ok_or_else(malformed)?;
            return Ok(Utc.from_utc_datetime(&epoch.and_time(time)));
        }
        let date = NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| malformed())?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(malformed)?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    if bytes[10] == b'T' {
        return DateTime::parse_from_rfc3339(s)
            .map(|tm| tm.with_timezone(&Utc))
            .map_err(|_| malformed());
    }

    // The offset sign sits 9, 6 or 3 bytes from the end depending on how many
    // of its hour/minute/second components the server printed.
    for width in [9, 6, 3] {
        let split = l - width;
        if bytes[split] == b'+' || bytes[split] == b'-' {
            let naive = NaiveDateTime::parse_from_str(&s[..split], TIMESTAMP_FORMAT).map_err(|_| malformed())?;
            let offset = parse_offset(&s[split..]).ok_or_else(malformed)?;
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|tm| tm.with_timezone(&Utc))
                .ok_or_else(malformed);
        }
    }

    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| malformed())?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parses `±HH`, `±HH:MM` or `±HH:MM:SS`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let mut seconds = 0;
    let mut scale = 3600;
    for part in s[1..].split(':') {
        if part.len() != 2 || scale == 0 {
            return None;
        }
        let value: i32 = part.parse().ok()?;
        seconds += value * scale;
        scale /= 60;
    }
    FixedOffset::east_opt(sign * seconds)
}

/// Formats `tm` in the canonical UTC layout.
pub fn format_time(tm: &DateTime<Utc>) -> String {
    let mut out = tm.format("%Y-%m-%d %H:%M:%S").to_string();
    let nanos = tm.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push_str("+00:00:00");
    out
}

/// Appends `tm` in the canonical UTC layout, quoted when `quote` is set.
pub fn append_time(b: &mut Vec<u8>, tm: &DateTime<Utc>, quote: bool) {
    if quote {
        b.push(b'\'');
    }
    b.extend_from_slice(format_time(tm).as_bytes());
    if quote {
        b.push(b'\'');
    }
}

impl ColumnValue for DateTime<Utc> {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        append_time(b, self, quote);
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        *self = match raw {
            None => DateTime::<Utc>::default(),
            Some(raw) => parse_time(raw)?,
        };
        Ok(())
    }
}
