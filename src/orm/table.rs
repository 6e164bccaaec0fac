//! Table metadata
//!
//! A [`Table`] is the derived mapping for one record type: its ordered stored
//! columns, the derived "method" columns and the declared relationships. The
//! accessors are plain function pointers generated by [`record!`](crate::record),
//! so the metadata is `Send + Sync` and is shared through the [`Registry`](super::Registry).

use super::model::Sequence;
use super::relation::{HasMany, HasOne, JoinKeys, RelationKind, RelationOps};
use crate::core::{RelbindError, Result};
use crate::types::ColumnValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// An application record mapped to one table.
///
/// Implemented by [`record!`](crate::record); a hand-written impl only has
/// to register its columns and relations in [`Record::describe`].
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Table name, used verbatim in generated SQL.
    const TABLE: &'static str;

    /// Registers the record's columns, derived columns and relations.
    fn describe(table: &mut TableBuilder<Self>);
}

/// A stored column and the accessors that reach it inside a record.
pub struct Column<T> {
    name: &'static str,
    get: fn(&T) -> &dyn ColumnValue,
    get_mut: fn(&mut T) -> &mut dyn ColumnValue,
}

impl<T> Column<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the column's value inside `record`; its vtable is the column codec.
    pub fn value<'r>(&self, record: &'r T) -> &'r dyn ColumnValue {
        (self.get)(record)
    }

    pub fn append_value(&self, b: &mut Vec<u8>, record: &T, quote: bool) {
        (self.get)(record).append_value(b, quote);
    }

    pub fn decode_value(&self, record: &mut T, raw: Option<&[u8]>) -> Result<()> {
        (self.get_mut)(record).decode_value(raw)
    }
}

/// A read-only column computed by a zero-argument method on the record.
pub struct Method<T> {
    name: &'static str,
    append: fn(&T, &mut Vec<u8>, bool),
}

impl<T> Method<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn append_value(&self, b: &mut Vec<u8>, record: &T, quote: bool) {
        (self.append)(record, b, quote);
    }
}

/// Derived mapping metadata for a record type.
pub struct Table<T: Record> {
    name: &'static str,
    type_name: &'static str,
    columns: Vec<Column<T>>,
    column_index: HashMap<&'static str, usize>,
    methods: HashMap<&'static str, Method<T>>,
    relations: HashMap<&'static str, Box<dyn RelationOps<T>>>,
}

impl<T: Record> Table<T> {
    /// Runs the record's `describe` hook and validates the result.
    pub(crate) fn derive() -> Result<Self> {
        let mut builder = TableBuilder::new();
        T::describe(&mut builder);
        builder.build()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Short name of the record type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Stored columns in declaration order.
    pub fn columns(&self) -> &[Column<T>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column<T>> {
        self.column_index.get(name).map(|&index| &self.columns[index])
    }

    pub fn method(&self, name: &str) -> Option<&Method<T>> {
        self.methods.get(name)
    }

    /// Kind of the relation declared under `name`, if any.
    pub fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.relations.get(name).map(|relation| relation.kind())
    }

    pub(crate) fn relation(&self, name: &str) -> Option<&dyn RelationOps<T>> {
        self.relations.get(name).map(|relation| relation.as_ref())
    }

    /// Looks up the relation a path step names, explaining why when the
    /// field cannot be traversed.
    pub(crate) fn relation_step(&self, name: &str) -> Result<&dyn RelationOps<T>> {
        if let Some(relation) = self.relation(name) {
            return Ok(relation);
        }
        let reason = if self.column(name).is_some() || self.method(name).is_some() {
            format!("{}.{} is a scalar column, not a record or sequence of records", self.type_name, name)
        } else {
            format!("{} has no field {:?}", self.type_name, name)
        };
        Err(RelbindError::UnsupportedShape(reason))
    }
}

impl<T: Record> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<_> = self.columns.iter().map(Column::name).collect();
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        let mut relations: Vec<_> = self.relations.keys().collect();
        relations.sort();
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("columns", &columns)
            .field("methods", &methods)
            .field("relations", &relations)
            .finish()
    }
}

/// Collects a record's declarations before they are validated into a [`Table`].
pub struct TableBuilder<T: Record> {
    columns: Vec<Column<T>>,
    methods: Vec<Method<T>>,
    relations: Vec<Box<dyn RelationOps<T>>>,
}

impl<T: Record> TableBuilder<T> {
    fn new() -> Self {
        TableBuilder {
            columns: Vec::new(),
            methods: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declares a stored column; declaration order is projection order.
    pub fn column(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &dyn ColumnValue,
        get_mut: fn(&mut T) -> &mut dyn ColumnValue,
    ) -> &mut Self {
        self.columns.push(Column { name, get, get_mut });
        self
    }

    /// Declares a derived column produced by a zero-argument method.
    pub fn method(&mut self, name: &'static str, append: fn(&T, &mut Vec<u8>, bool)) -> &mut Self {
        self.methods.push(Method { name, append });
        self
    }

    /// Declares a to-one relation stored in an `Option<Box<R>>` field,
    /// matched where `T.local = R.foreign`.
    pub fn has_one<R: Record>(
        &mut self,
        name: &'static str,
        local: &'static str,
        foreign: &'static str,
        get: fn(&T) -> &Option<Box<R>>,
        get_mut: fn(&mut T) -> &mut Option<Box<R>>,
    ) -> &mut Self {
        let keys = JoinKeys { local, foreign };
        self.relations.push(Box::new(HasOne::new(name, keys, get, get_mut)));
        self
    }

    /// Declares a to-many relation stored in a `Vec<R>` or `Vec<Box<R>>`
    /// field, matched where `T.local = R.foreign`.
    pub fn has_many<R: Record, C: Sequence<R> + Send + Sync + 'static>(
        &mut self,
        name: &'static str,
        local: &'static str,
        foreign: &'static str,
        get: fn(&T) -> &C,
        get_mut: fn(&mut T) -> &mut C,
    ) -> &mut Self {
        let keys = JoinKeys { local, foreign };
        self.relations.push(Box::new(HasMany::new(name, keys, get, get_mut)));
        self
    }

    fn build(self) -> Result<Table<T>> {
        let type_name = short_type_name::<T>();
        let unsupported = |reason: String| RelbindError::UnsupportedShape(format!("{}: {}", type_name, reason));

        if !IDENTIFIER.is_match(T::TABLE) {
            return Err(unsupported(format!("table name {:?} is not a plain identifier", T::TABLE)));
        }

        let names = self
            .columns
            .iter()
            .map(Column::name)
            .chain(self.methods.iter().map(Method::name))
            .chain(self.relations.iter().map(|relation| relation.name()));
        let mut seen = HashSet::new();
        for name in names {
            if !IDENTIFIER.is_match(name) {
                return Err(unsupported(format!("field {:?} is not a plain identifier", name)));
            }
            if !seen.insert(name) {
                return Err(unsupported(format!("field {:?} is declared twice", name)));
            }
        }

        let column_index = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.name, index))
            .collect();
        let methods = self.methods.into_iter().map(|method| (method.name, method)).collect();
        let relations = self
            .relations
            .into_iter()
            .map(|relation| (relation.name(), relation))
            .collect();

        debug!(
            "Derived table {} for {} with {} columns",
            T::TABLE,
            type_name,
            self.columns.len()
        );

        Ok(Table {
            name: T::TABLE,
            type_name,
            columns: self.columns,
            column_index,
            methods,
            relations,
        })
    }
}

/// `std::any::type_name` without the module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Book {
        id: i64,
        title: String,
        pages: Option<i32>,
    }

    impl Book {
        fn title_length(&self) -> i64 {
            self.title.len() as i64
        }
    }

    crate::record! {
        Book in "book" {
            columns: [id, title, pages],
            methods: [title_length],
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Duplicated {
        id: i64,
    }

    impl Record for Duplicated {
        const TABLE: &'static str = "duplicated";

        fn describe(table: &mut TableBuilder<Self>) {
            table
                .column("id", |r| &r.id, |r| &mut r.id)
                .column("id", |r| &r.id, |r| &mut r.id);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct BadName {
        id: i64,
    }

    impl Record for BadName {
        const TABLE: &'static str = "bad_name";

        fn describe(table: &mut TableBuilder<Self>) {
            table.column("id; DROP TABLE x", |r| &r.id, |r| &mut r.id);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct BadTable;

    impl Record for BadTable {
        const TABLE: &'static str = "bad table";

        fn describe(_table: &mut TableBuilder<Self>) {}
    }

    #[test]
    fn test_derive_keeps_declaration_order() {
        let table = Table::<Book>::derive().unwrap();
        assert_eq!(table.name(), "book");
        assert_eq!(table.type_name(), "Book");

        let names: Vec<_> = table.columns().iter().map(Column::name).collect();
        assert_eq!(names, vec!["id", "title", "pages"]);
        assert!(table.column("title").is_some());
        assert!(table.column("title_length").is_none());
        assert!(table.method("title_length").is_some());
    }

    #[test]
    fn test_column_accessors() {
        let table = Table::<Book>::derive().unwrap();
        let mut book = Book::default();

        let title = table.column("title").unwrap();
        title.decode_value(&mut book, Some("Dune".as_bytes())).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(encode(title.value(&book), true), b"'Dune'");

        let mut b = Vec::new();
        table.method("title_length").unwrap().append_value(&mut b, &book, true);
        assert_eq!(b, b"4");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        match Table::<Duplicated>::derive() {
            Err(RelbindError::UnsupportedShape(msg)) => assert!(msg.contains("declared twice"), "{}", msg),
            other => panic!("Expected UnsupportedShape, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        assert!(matches!(Table::<BadName>::derive(), Err(RelbindError::UnsupportedShape(_))));
        assert!(matches!(Table::<BadTable>::derive(), Err(RelbindError::UnsupportedShape(_))));
    }

    #[test]
    fn test_relation_step_explains_failures() {
        let table = Table::<Book>::derive().unwrap();
        match table.relation_step("title") {
            Err(RelbindError::UnsupportedShape(msg)) => assert!(msg.contains("scalar column")),
            _ => panic!("Expected UnsupportedShape for scalar column"),
        }
        match table.relation_step("nope") {
            Err(RelbindError::UnsupportedShape(msg)) => assert!(msg.contains("no field")),
            _ => panic!("Expected UnsupportedShape for unknown field"),
        }
    }
}
