//! Scalar collections as row sinks.
//!
//! A `Vec<T>` of any codec type receives a single-column result set, one
//! element per row, without declaring a record for it.

use super::ColumnValue;
use crate::core::db::ColumnLoader;
use crate::core::{RelbindError, Result};

impl<T: ColumnValue + Default> ColumnLoader for Vec<T> {
    fn new_row(&mut self) -> Result<()> {
        self.push(T::default());
        Ok(())
    }

    fn load_column(&mut self, index: usize, name: &str, raw: Option<&[u8]>) -> Result<()> {
        if index > 0 {
            return Err(RelbindError::UnsupportedInput(format!(
                "scalar collection takes a single column, got {:?} at position {}",
                name, index
            )));
        }
        let value = self
            .last_mut()
            .ok_or(RelbindError::NoCurrentElement("scalar collection"))?;
        value.decode_value(raw)
    }
}
