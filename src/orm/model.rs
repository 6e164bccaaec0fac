//! Model binding
//!
//! A [`Model`] pairs a record type's [`Table`] metadata with a mutable
//! destination. The destination is one of:
//!
//! * a single record (`Binding::Value`),
//! * a growable sequence of records or boxed records (`Binding::Sequence`),
//! * a path of relation fields below an owner record (`Binding::Path`),
//!   resolved lazily the first time the model has to write through it.
//!
//! Result rows are decoded through the model, and query parameters are
//! rendered from the record it currently points at.

use super::registry::Registry;
use super::relation::{RelationKind, TargetMut, TargetRef};
use super::table::{Record, Table};
use crate::core::db::{ColumnLoader, ParamSource};
use crate::core::{RelbindError, Result};
use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

mod sealed {
    pub trait Sealed {}

    impl<T> Sealed for Vec<T> {}
}

/// A growable container of records a model can append to.
///
/// Implemented for `Vec<T>` and `Vec<Box<T>>`. The current element of a
/// sequence is always its last one.
pub trait Sequence<T>: sealed::Sealed {
    fn element_count(&self) -> usize;

    /// Pushes a zero-valued record and returns it.
    fn append_default(&mut self) -> &mut T;

    fn append(&mut self, value: T);

    fn current(&self) -> Option<&T>;

    fn current_mut(&mut self) -> Option<&mut T>;

    /// Removes every element.
    fn reset(&mut self);

    fn elements_mut(&mut self) -> Vec<&mut T>;
}

impl<T: Record> Sequence<T> for Vec<T> {
    fn element_count(&self) -> usize {
        self.len()
    }

    fn append_default(&mut self) -> &mut T {
        let index = self.len();
        self.push(T::default());
        &mut self[index]
    }

    fn append(&mut self, value: T) {
        self.push(value);
    }

    fn current(&self) -> Option<&T> {
        self.last()
    }

    fn current_mut(&mut self) -> Option<&mut T> {
        self.last_mut()
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn elements_mut(&mut self) -> Vec<&mut T> {
        self.iter_mut().collect()
    }
}

impl<T: Record> Sequence<T> for Vec<Box<T>> {
    fn element_count(&self) -> usize {
        self.len()
    }

    fn append_default(&mut self) -> &mut T {
        let index = self.len();
        self.push(Box::default());
        &mut self[index]
    }

    fn append(&mut self, value: T) {
        self.push(Box::new(value));
    }

    fn current(&self) -> Option<&T> {
        self.last().map(|record| &**record)
    }

    fn current_mut(&mut self) -> Option<&mut T> {
        self.last_mut().map(|record| &mut **record)
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn elements_mut(&mut self) -> Vec<&mut T> {
        self.iter_mut().map(|record| &mut **record).collect()
    }
}

/// The record a model currently points at.
///
/// Unresolved path bindings have nothing to borrow yet and yield a
/// transient zero-valued record instead.
#[derive(Debug)]
pub enum Current<'m, T> {
    Bound(&'m T),
    Transient(T),
}

impl<T> Deref for Current<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Current::Bound(record) => record,
            Current::Transient(record) => record,
        }
    }
}

/// Owner side of a path binding, with the owner's type erased.
trait PathRoot<'a> {
    fn resolve_mut(self: Box<Self>, path: &[String], registry: &Registry) -> Result<TargetMut<'a>>;

    fn resolve_ref(&self, path: &[String], registry: &Registry) -> Result<TargetRef<'_>>;
}

struct Root<'a, O: Record> {
    owner: &'a mut O,
    table: Arc<Table<O>>,
}

impl<'a, O: Record> PathRoot<'a> for Root<'a, O> {
    fn resolve_mut(self: Box<Self>, path: &[String], registry: &Registry) -> Result<TargetMut<'a>> {
        let Root { owner, table } = *self;
        let (first, rest) = split_path(path)?;
        table.relation_step(first)?.resolve_mut(owner, rest, registry)
    }

    fn resolve_ref(&self, path: &[String], registry: &Registry) -> Result<TargetRef<'_>> {
        let (first, rest) = split_path(path)?;
        self.table.relation_step(first)?.resolve_ref(&*self.owner, rest, registry)
    }
}

fn split_path(path: &[String]) -> Result<(&String, &[String])> {
    path.split_first()
        .ok_or_else(|| RelbindError::UnsupportedShape("empty field path".to_string()))
}

enum PathState<'a, T: Record> {
    Pending(Box<dyn PathRoot<'a> + 'a>),
    /// Left behind when a resolution attempt fails part way.
    Resolving,
    Value(&'a mut T),
    Sequence(&'a mut (dyn Sequence<T> + 'static)),
}

struct PathBinding<'a, T: Record> {
    path: Vec<String>,
    kind: RelationKind,
    state: PathState<'a, T>,
}

enum Binding<'a, T: Record> {
    Value(&'a mut T),
    Sequence(&'a mut (dyn Sequence<T> + 'static)),
    Path(PathBinding<'a, T>),
}

enum SlotMut<'m, T> {
    Value(&'m mut T),
    Sequence(&'m mut (dyn Sequence<T> + 'static)),
}

impl<'a, T: Record> PathBinding<'a, T> {
    fn resolve_mut(&mut self, registry: &Registry) -> Result<SlotMut<'_, T>> {
        let state = std::mem::replace(&mut self.state, PathState::Resolving);
        self.state = match state {
            PathState::Pending(root) => {
                trace!("Resolving field path {}", self.path.join("."));
                match root.resolve_mut(&self.path, registry)? {
                    TargetMut::One(target) => PathState::Value(downcast_record::<T>(target)?),
                    TargetMut::Many(target) => PathState::Sequence(downcast_sequence::<T>(target)?),
                }
            }
            resolved => resolved,
        };

        match &mut self.state {
            PathState::Value(value) => Ok(SlotMut::Value(&mut **value)),
            PathState::Sequence(sequence) => Ok(SlotMut::Sequence(&mut **sequence)),
            PathState::Pending(_) | PathState::Resolving => Err(RelbindError::App(format!(
                "field path {} failed to resolve earlier",
                self.path.join(".")
            ))),
        }
    }
}

fn type_mismatch<T: Record>() -> RelbindError {
    RelbindError::App(format!(
        "field path target is not a {}",
        std::any::type_name::<T>()
    ))
}

fn downcast_record<'t, T: Record>(target: &'t mut (dyn Any + 'static)) -> Result<&'t mut T> {
    target.downcast_mut::<T>().ok_or_else(type_mismatch::<T>)
}

fn downcast_sequence<'t, T: Record>(target: &'t mut (dyn Any + 'static)) -> Result<&'t mut (dyn Sequence<T> + 'static)> {
    if target.is::<Vec<T>>() {
        let sequence = target.downcast_mut::<Vec<T>>().ok_or_else(type_mismatch::<T>)?;
        return Ok(sequence);
    }
    let sequence = target.downcast_mut::<Vec<Box<T>>>().ok_or_else(type_mismatch::<T>)?;
    Ok(sequence)
}

fn sequence_ref<'t, T: Record>(target: &'t (dyn Any + 'static)) -> Result<&'t (dyn Sequence<T> + 'static)> {
    if let Some(sequence) = target.downcast_ref::<Vec<T>>() {
        return Ok(sequence);
    }
    let sequence = target.downcast_ref::<Vec<Box<T>>>().ok_or_else(type_mismatch::<T>)?;
    Ok(sequence)
}

/// A record type's metadata bound to a mutable destination.
pub struct Model<'a, T: Record> {
    table: Arc<Table<T>>,
    registry: &'a Registry,
    binding: Binding<'a, T>,
}

impl<'a, T: Record> Model<'a, T> {
    /// Binds to a single record using the global registry.
    pub fn from_value(value: &'a mut T) -> Result<Self> {
        Self::bind_value(Registry::global(), value)
    }

    /// Binds to a sequence of records using the global registry.
    pub fn from_sequence(sequence: &'a mut (dyn Sequence<T> + 'static)) -> Result<Self> {
        Self::bind_sequence(Registry::global(), sequence)
    }

    /// Binds to the relation field(s) reached by `path` from `owner`.
    ///
    /// The path is validated against the metadata immediately, but nothing
    /// is written into `owner` until the model first needs a writable target.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedShape` when a step does not name a relation field,
    /// when the path continues past a to-many field, or when it ends at a
    /// record type other than `T`.
    pub fn from_path<O: Record>(owner: &'a mut O, path: &[&str]) -> Result<Self> {
        Self::bind_path(Registry::global(), owner, path)
    }

    /// Binds to an untyped value: a `T`, a `Box<T>`, a `Vec<T>` or a
    /// `Vec<Box<T>>`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedInput` for anything else.
    pub fn from_any(value: &'a mut (dyn Any + 'static)) -> Result<Self> {
        Self::bind_any(Registry::global(), value)
    }

    pub(crate) fn bind_value(registry: &'a Registry, value: &'a mut T) -> Result<Self> {
        Ok(Model {
            table: registry.table::<T>()?,
            registry,
            binding: Binding::Value(value),
        })
    }

    pub(crate) fn bind_sequence(registry: &'a Registry, sequence: &'a mut (dyn Sequence<T> + 'static)) -> Result<Self> {
        Ok(Model {
            table: registry.table::<T>()?,
            registry,
            binding: Binding::Sequence(sequence),
        })
    }

    pub(crate) fn bind_path<O: Record>(registry: &'a Registry, owner: &'a mut O, path: &[&str]) -> Result<Self> {
        let owner_table = registry.table::<O>()?;
        let path: Vec<String> = path.iter().map(|step| step.to_string()).collect();
        let (first, rest) = split_path(&path)?;
        let terminal = owner_table.relation_step(first)?.terminal(rest, registry)?;
        if terminal.type_id != std::any::TypeId::of::<T>() {
            return Err(RelbindError::UnsupportedShape(format!(
                "field path {} of {} leads to {}, not {}",
                path.join("."),
                owner_table.type_name(),
                terminal.type_name,
                super::table::short_type_name::<T>()
            )));
        }

        Ok(Model {
            table: registry.table::<T>()?,
            registry,
            binding: Binding::Path(PathBinding {
                path,
                kind: terminal.kind,
                state: PathState::Pending(Box::new(Root {
                    owner,
                    table: owner_table,
                })),
            }),
        })
    }

    pub(crate) fn bind_any(registry: &'a Registry, value: &'a mut (dyn Any + 'static)) -> Result<Self> {
        if value.is::<T>() {
            let record = downcast_record::<T>(value)?;
            return Self::bind_value(registry, record);
        }
        if value.is::<Box<T>>() {
            let boxed = value.downcast_mut::<Box<T>>().ok_or_else(type_mismatch::<T>)?;
            return Self::bind_value(registry, &mut **boxed);
        }
        if value.is::<Vec<T>>() || value.is::<Vec<Box<T>>>() {
            let sequence = downcast_sequence::<T>(value)?;
            return Self::bind_sequence(registry, sequence);
        }
        Err(RelbindError::UnsupportedInput(format!(
            "expected {} or a sequence of it",
            std::any::type_name::<T>()
        )))
    }

    pub fn table(&self) -> &Table<T> {
        &self.table
    }

    /// Whether rows decode into freshly allocated sequence elements.
    pub fn is_sequence(&self) -> bool {
        match &self.binding {
            Binding::Value(_) => false,
            Binding::Sequence(_) => true,
            Binding::Path(path) => path.kind == RelationKind::HasMany,
        }
    }

    /// Returns the projection list: one `table.column AS "<prefix>column"`
    /// entry per stored column, in declaration order.
    pub fn columns(&self, prefix: &str) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.table.columns().len());
        self.append_columns(&mut columns, prefix);
        columns
    }

    pub fn append_columns(&self, columns: &mut Vec<String>, prefix: &str) {
        let table = self.table.name();
        for column in self.table.columns() {
            columns.push(format!("{}.{} AS \"{}{}\"", table, column.name(), prefix, column.name()));
        }
    }

    fn slot_mut(&mut self) -> Result<SlotMut<'_, T>> {
        match &mut self.binding {
            Binding::Value(value) => Ok(SlotMut::Value(&mut **value)),
            Binding::Sequence(sequence) => Ok(SlotMut::Sequence(&mut **sequence)),
            Binding::Path(path) => path.resolve_mut(self.registry),
        }
    }

    /// Appends a zero-valued element to the bound sequence and makes it
    /// current. Path bindings are resolved first, creating absent
    /// intermediate records.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedInput` when the model is bound to a single record.
    pub fn allocate_next_element(&mut self) -> Result<&mut T> {
        let type_name = self.table.type_name();
        match self.slot_mut()? {
            SlotMut::Sequence(sequence) => Ok(sequence.append_default()),
            SlotMut::Value(_) => Err(RelbindError::UnsupportedInput(format!(
                "{} model is bound to a single record, not a sequence",
                type_name
            ))),
        }
    }

    /// Returns the record rows decode into: the bound record itself, or the
    /// last element of the bound sequence.
    pub fn current_mut(&mut self) -> Result<&mut T> {
        let type_name = self.table.type_name();
        match self.slot_mut()? {
            SlotMut::Value(value) => Ok(value),
            SlotMut::Sequence(sequence) => sequence
                .current_mut()
                .ok_or(RelbindError::NoCurrentElement(type_name)),
        }
    }

    /// Returns every record reachable through the binding.
    pub fn elements_mut(&mut self) -> Result<Vec<&mut T>> {
        match self.slot_mut()? {
            SlotMut::Value(value) => Ok(vec![value]),
            SlotMut::Sequence(sequence) => Ok(sequence.elements_mut()),
        }
    }

    /// Clears a bound sequence, or zeroes a bound record.
    pub fn reset(&mut self) -> Result<()> {
        match self.slot_mut()? {
            SlotMut::Value(value) => *value = T::default(),
            SlotMut::Sequence(sequence) => sequence.reset(),
        }
        Ok(())
    }

    /// Returns the current record without resolving a pending path.
    ///
    /// A to-one path whose relation fields are still unset yields a
    /// transient zero-valued record.
    ///
    /// # Errors
    ///
    /// Returns `NoCurrentElement` for an empty sequence, or for a to-many
    /// path that cannot be reached without writing.
    pub fn current(&self) -> Result<Current<'_, T>> {
        let none = || RelbindError::NoCurrentElement(self.table.type_name());
        let path = match &self.binding {
            Binding::Value(value) => return Ok(Current::Bound(&**value)),
            Binding::Sequence(sequence) => return sequence.current().map(Current::Bound).ok_or_else(none),
            Binding::Path(path) => path,
        };

        match &path.state {
            PathState::Value(value) => Ok(Current::Bound(&**value)),
            PathState::Sequence(sequence) => sequence.current().map(Current::Bound).ok_or_else(none),
            PathState::Pending(root) => match root.resolve_ref(&path.path, self.registry)? {
                TargetRef::One(target) => target
                    .downcast_ref::<T>()
                    .map(Current::Bound)
                    .ok_or_else(type_mismatch::<T>),
                TargetRef::Many(target) => sequence_ref::<T>(target)?
                    .current()
                    .map(Current::Bound)
                    .ok_or_else(none),
                TargetRef::Unset if path.kind == RelationKind::HasOne => Ok(Current::Transient(T::default())),
                TargetRef::Unset => Err(none()),
            },
            PathState::Resolving => Err(RelbindError::App(format!(
                "field path {} failed to resolve earlier",
                path.path.join(".")
            ))),
        }
    }

    /// Appends the quoted SQL literal for a stored column or derived
    /// column of the current record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` when `name` is neither.
    pub fn append_param(&self, b: &mut Vec<u8>, name: &str) -> Result<()> {
        if let Some(column) = self.table.column(name) {
            column.append_value(b, &*self.current()?, true);
            return Ok(());
        }
        if let Some(method) = self.table.method(name) {
            method.append_value(b, &*self.current()?, true);
            return Ok(());
        }
        Err(RelbindError::UnknownColumn {
            record: self.table.type_name(),
            column: name.to_string(),
        })
    }

    /// Decodes one raw column value into the current record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` when no stored column is called `name`; the
    /// row position is not consulted.
    pub fn decode_column(&mut self, _index: usize, name: &str, raw: Option<&[u8]>) -> Result<()> {
        let table = Arc::clone(&self.table);
        let column = table.column(name).ok_or_else(|| RelbindError::UnknownColumn {
            record: table.type_name(),
            column: name.to_string(),
        })?;
        column.decode_value(self.current_mut()?, raw)
    }
}

impl<T: Record> std::fmt::Debug for Model<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let binding = match &self.binding {
            Binding::Value(_) => "value".to_string(),
            Binding::Sequence(_) => "sequence".to_string(),
            Binding::Path(path) => format!("path {}", path.path.join(".")),
        };
        f.debug_struct("Model")
            .field("table", &self.table.name())
            .field("binding", &binding)
            .finish()
    }
}

impl<T: Record> ColumnLoader for Model<'_, T> {
    fn new_row(&mut self) -> Result<()> {
        if self.is_sequence() {
            self.allocate_next_element()?;
        }
        Ok(())
    }

    fn load_column(&mut self, index: usize, name: &str, raw: Option<&[u8]>) -> Result<()> {
        self.decode_column(index, name, raw)
    }
}

impl<T: Record> ParamSource for Model<'_, T> {
    fn append_param(&self, b: &mut Vec<u8>, name: &str) -> Result<()> {
        Model::append_param(self, b, name)
    }
}
