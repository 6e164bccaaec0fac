use super::model::{Model, Sequence};
use super::table::{Record, Table};
use crate::core::{RelbindError, Result};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Process-wide cache of derived [`Table`] metadata, keyed by record type.
///
/// Metadata for a type is derived at most once per registry; every caller
/// afterwards receives the same `Arc`.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Registry {
    /// Creates an isolated registry, mostly useful in tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Returns the metadata for `T`, deriving and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedShape` when the record's declarations are invalid.
    /// Nothing is cached in that case.
    pub fn table<T: Record>(&self) -> Result<Arc<Table<T>>> {
        let key = TypeId::of::<T>();
        {
            let tables = self
                .tables
                .read()
                .map_err(|_| RelbindError::App("table registry lock poisoned".to_string()))?;
            if let Some(entry) = tables.get(&key) {
                return downcast_table(Arc::clone(entry));
            }
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| RelbindError::App("table registry lock poisoned".to_string()))?;
        // Another thread may have won the race between the two locks.
        if let Some(entry) = tables.get(&key) {
            return downcast_table(Arc::clone(entry));
        }
        let table = Arc::new(Table::<T>::derive()?);
        debug!("Registered table {} for {}", table.name(), table.type_name());
        tables.insert(key, Arc::clone(&table) as Arc<dyn Any + Send + Sync>);
        Ok(table)
    }

    /// Number of record types derived so far.
    pub fn len(&self) -> usize {
        self.tables.read().map(|tables| tables.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds a model to a single record.
    pub fn model<'a, T: Record>(&'a self, value: &'a mut T) -> Result<Model<'a, T>> {
        Model::bind_value(self, value)
    }

    /// Binds a model to a growable sequence of records or boxed records.
    pub fn model_sequence<'a, T: Record>(&'a self, sequence: &'a mut (dyn Sequence<T> + 'static)) -> Result<Model<'a, T>> {
        Model::bind_sequence(self, sequence)
    }

    /// Binds a model to the record (or sequence of records) reached by
    /// following `path` through relation fields of `owner`.
    pub fn model_path<'a, T: Record, O: Record>(&'a self, owner: &'a mut O, path: &[&str]) -> Result<Model<'a, T>> {
        Model::bind_path(self, owner, path)
    }

    /// Binds a model to an untyped value, which must be a `T`, a `Box<T>`, a
    /// `Vec<T>` or a `Vec<Box<T>>`.
    pub fn model_any<'a, T: Record>(&'a self, value: &'a mut (dyn Any + 'static)) -> Result<Model<'a, T>> {
        Model::bind_any(self, value)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("tables", &self.len()).finish()
    }
}

fn downcast_table<T: Record>(entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<Table<T>>> {
    entry.downcast::<Table<T>>().map_err(|_| {
        RelbindError::App(format!(
            "registry entry for {} holds another type",
            std::any::type_name::<T>()
        ))
    })
}
