//! Error types shared by the whole crate.
//!
//! Every fallible operation returns [`Result`], so mapping, codec and driver
//! failures propagate through `?` without conversion at call sites.
use thiserror::Error;

/// Errors raised while mapping records to tables, encoding/decoding column
/// values or loading relationships.
#[derive(Error, Debug)]
pub enum RelbindError {
    /// A type (or the field a path ends at) cannot be mapped to a table.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// A value passed for binding is neither a record nor a sequence of records.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// A column or parameter name has no stored field or derived accessor.
    #[error("can't find column {column:?} in {record}")]
    UnknownColumn { record: &'static str, column: String },

    /// The temporal codec could not recognise the byte layout.
    #[error("malformed temporal value: {0:?}")]
    MalformedTemporalValue(String),

    /// A scalar codec rejected the raw column bytes.
    #[error("can't decode {raw:?} as {kind}")]
    Decode { kind: &'static str, raw: String },

    /// A sequence binding was read or decoded before any element was allocated.
    #[error("no current element in sequence of {0}")]
    NoCurrentElement(&'static str),

    /// A related row matched none of the parents it was fetched for.
    #[error("related row with key {key} in relation {relation:?} has no parent")]
    OrphanRow { relation: String, key: String },

    /// Errors reported by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Statement preparation or execution errors
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected internal conditions (poisoned locks and the like)
    #[error("Application error: {0}")]
    App(String),
}

impl RelbindError {
    pub(crate) fn decode(kind: &'static str, raw: &[u8]) -> Self {
        RelbindError::Decode {
            kind,
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

/// Type alias for Result to use RelbindError as the error type.
pub type Result<T> = std::result::Result<T, RelbindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelbindError::UnknownColumn {
            record: "Entry",
            column: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "can't find column \"missing\" in Entry");

        let err = RelbindError::MalformedTemporalValue("2024-1".to_string());
        assert!(err.to_string().contains("2024-1"));

        let err = RelbindError::decode("i64", b"ten");
        assert_eq!(err.to_string(), "can't decode \"ten\" as i64");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RelbindError = io_err.into();
        match err {
            RelbindError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: RelbindError = json_err.into();
        match err {
            RelbindError::Json(_) => {}
            _ => panic!("Expected JSON error"),
        }

        let err: RelbindError = rusqlite::Error::ExecuteReturnedResults.into();
        assert!(err.to_string().contains("Database error"));
    }
}
