//! Value Codec
//!
//! Every mapped column holds a value implementing [`ColumnValue`]. A codec
//! knows how to append itself to an output buffer, either as raw wire text or
//! as a quoted SQL literal, and how to decode the raw bytes a server returns
//! for that column back into itself.
//!
//! The trait is object safe: column accessors hand out `&dyn ColumnValue` /
//! `&mut dyn ColumnValue`, and the vtable behind them is the per-column codec.

mod collection;
mod scalar;
pub mod time;

use crate::core::Result;

pub use time::{append_time, format_time, parse_time, parse_time_str};

/// Encode/decode contract for a single column value.
pub trait ColumnValue {
    /// Appends the value to `b`. With `quote` set the output is a complete
    /// SQL literal (strings quoted and escaped); otherwise it is the raw
    /// textual form the server would send back for the same value.
    fn append_value(&self, b: &mut Vec<u8>, quote: bool);

    /// Replaces the value with the decoded form of `raw`. `None` is a SQL
    /// `NULL`, which decodes to the zero value for non-optional kinds.
    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()>;
}

impl<T: ColumnValue + Default> ColumnValue for Option<T> {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        match self {
            Some(value) => value.append_value(b, quote),
            None => b.extend_from_slice(b"NULL"),
        }
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        match raw {
            None => *self = None,
            Some(raw) => {
                let mut value = T::default();
                value.decode_value(Some(raw))?;
                *self = Some(value);
            }
        }
        Ok(())
    }
}

/// Encodes `value` into a fresh buffer.
pub fn encode(value: &dyn ColumnValue, quote: bool) -> Vec<u8> {
    let mut b = Vec::new();
    value.append_value(&mut b, quote);
    b
}

/// Appends `s` as a single-quoted SQL string literal, doubling embedded quotes.
pub fn append_quoted(b: &mut Vec<u8>, s: &[u8]) {
    b.push(b'\'');
    for &c in s {
        if c == b'\'' {
            b.push(b'\'');
        }
        b.push(c);
    }
    b.push(b'\'');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_null_roundtrip() {
        let mut value: Option<i64> = Some(3);
        assert_eq!(encode(&value, true), b"3");

        value.decode_value(None).unwrap();
        assert_eq!(value, None);
        assert_eq!(encode(&value, true), b"NULL");

        value.decode_value(Some("42".as_bytes())).unwrap();
        assert_eq!(value, Some(42));
    }

    #[test]
    fn test_append_quoted_escapes() {
        let mut b = Vec::new();
        append_quoted(&mut b, b"it's");
        assert_eq!(b, b"'it''s'");
    }

    #[test]
    fn test_option_decode_error_keeps_previous_value() {
        let mut value: Option<i32> = Some(7);
        assert!(value.decode_value(Some("seven".as_bytes())).is_err());
        assert_eq!(value, Some(7));
    }
}
