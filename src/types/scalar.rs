use super::{append_quoted, ColumnValue};
use crate::core::{RelbindError, Result};
use std::str::FromStr;
use uuid::Uuid;

fn parse_text<T: FromStr>(raw: &[u8], kind: &'static str) -> Result<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RelbindError::decode(kind, raw))
}

macro_rules! impl_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn append_value(&self, b: &mut Vec<u8>, _quote: bool) {
                    b.extend_from_slice(self.to_string().as_bytes());
                }

                fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
                    *self = match raw {
                        None => 0,
                        Some(raw) => parse_text(raw, stringify!($ty))?,
                    };
                    Ok(())
                }
            }
        )+
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
                    let special: Option<&[u8]> = if self.is_nan() {
                        Some(b"NaN".as_slice())
                    } else if self.is_infinite() && self.is_sign_positive() {
                        Some(b"Infinity".as_slice())
                    } else if self.is_infinite() {
                        Some(b"-Infinity".as_slice())
                    } else {
                        None
                    };
                    match special {
                        Some(text) if quote => append_quoted(b, text),
                        Some(text) => b.extend_from_slice(text),
                        None => b.extend_from_slice(self.to_string().as_bytes()),
                    }
                }

                fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
                    *self = match raw {
                        None => 0.0,
                        Some(b"NaN") => <$ty>::NAN,
                        Some(b"Infinity") => <$ty>::INFINITY,
                        Some(b"-Infinity") => <$ty>::NEG_INFINITY,
                        Some(raw) => parse_text(raw, stringify!($ty))?,
                    };
                    Ok(())
                }
            }
        )+
    };
}

impl_float!(f32, f64);

impl ColumnValue for bool {
    fn append_value(&self, b: &mut Vec<u8>, _quote: bool) {
        b.extend_from_slice(if *self { b"TRUE" } else { b"FALSE" });
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        let Some(raw) = raw else {
            *self = false;
            return Ok(());
        };
        *self = match raw.to_ascii_lowercase().as_slice() {
            b"t" | b"true" | b"1" => true,
            b"f" | b"false" | b"0" => false,
            _ => return Err(RelbindError::decode("bool", raw)),
        };
        Ok(())
    }
}

impl ColumnValue for String {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        if quote {
            append_quoted(b, self.as_bytes());
        } else {
            b.extend_from_slice(self.as_bytes());
        }
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        let text = match raw {
            None => "",
            Some(raw) => std::str::from_utf8(raw).map_err(|_| RelbindError::decode("String", raw))?,
        };
        self.clear();
        self.push_str(text);
        Ok(())
    }
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn decode_bytea(raw: &[u8]) -> Result<Vec<u8>> {
    let Some(hex) = raw.strip_prefix(b"\\x") else {
        // Drivers that hand over blobs directly skip the hex form.
        return Ok(raw.to_vec());
    };
    if hex.len() % 2 != 0 {
        return Err(RelbindError::decode("bytea", raw));
    }
    hex.chunks(2)
        .map(|pair| match (hex_digit(pair[0]), hex_digit(pair[1])) {
            (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
            _ => Err(RelbindError::decode("bytea", raw)),
        })
        .collect()
}

/// Byte strings use the `\x` hex form of bytea.
impl ColumnValue for Vec<u8> {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        if quote {
            b.push(b'\'');
        }
        b.extend_from_slice(b"\\x");
        for byte in self {
            b.push(HEX[(byte >> 4) as usize]);
            b.push(HEX[(byte & 0x0f) as usize]);
        }
        if quote {
            b.push(b'\'');
        }
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        *self = match raw {
            None => Vec::new(),
            Some(raw) => decode_bytea(raw)?,
        };
        Ok(())
    }
}

impl ColumnValue for serde_json::Value {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        let text = self.to_string();
        if quote {
            append_quoted(b, text.as_bytes());
        } else {
            b.extend_from_slice(text.as_bytes());
        }
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        *self = match raw {
            None => serde_json::Value::Null,
            Some(raw) => serde_json::from_slice(raw)?,
        };
        Ok(())
    }
}

impl ColumnValue for Uuid {
    fn append_value(&self, b: &mut Vec<u8>, quote: bool) {
        let text = self.hyphenated().to_string();
        if quote {
            append_quoted(b, text.as_bytes());
        } else {
            b.extend_from_slice(text.as_bytes());
        }
    }

    fn decode_value(&mut self, raw: Option<&[u8]>) -> Result<()> {
        *self = match raw {
            None => Uuid::nil(),
            Some(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| RelbindError::decode("uuid", raw))?,
        };
        Ok(())
    }
}
