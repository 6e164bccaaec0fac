//! Records and fixtures shared by the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use relbind::core::db::{ColumnLoader, QueryExecutor, Queryer};
use relbind::orm::{Record, Registry};
use relbind::{record, Result};
use rusqlite::Connection;
use std::cell::RefCell;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

record! {
    Role in "role" {
        columns: [id, name],
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub role_id: Option<i64>,
    pub role: Option<Box<Role>>,
    pub entries: Vec<Entry>,
}

impl Author {
    pub fn display_name(&self) -> String {
        format!("{} (#{})", self.name, self.id)
    }
}

record! {
    Author in "author" {
        columns: [id, name, role_id],
        methods: [display_name],
        has_one: [role: Role => role_id = id],
        has_many: [entries: Entry => id = author_id],
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub author: Option<Box<Author>>,
}

record! {
    Entry in "entry" {
        columns: [id, title, author_id, created_at],
        has_one: [author: Author => author_id = id],
    }
}

/// Parent keyed by a nullable text code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Owner {
    pub code: Option<String>,
    pub items: Vec<Item>,
}

record! {
    Owner in "owner" {
        columns: [code],
        has_many: [items: Item => code = owner_code],
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub id: i64,
    pub owner_code: String,
}

record! {
    Item in "item" {
        columns: [id, owner_code],
    }
}

pub const SCHEMA: &str = "
    CREATE TABLE role (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL, role_id INTEGER);
    CREATE TABLE entry (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        author_id INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    INSERT INTO role VALUES (1, 'admin'), (2, 'editor');
    INSERT INTO author VALUES (10, 'user 1', 1), (11, 'user 2', NULL), (12, 'user 3', 2);
    INSERT INTO entry VALUES
        (100, 'article 1', 10, '2024-01-02 15:04:05-07'),
        (101, 'article 2', 10, '2024-01-03 09:00:00+00:00'),
        (102, 'article 3', 12, '2024-02-01T12:30:00Z');
    CREATE TABLE owner (code TEXT);
    CREATE TABLE item (id INTEGER PRIMARY KEY, owner_code TEXT NOT NULL);
    INSERT INTO item VALUES (1, 'NULL'), (2, 'b');
";

/// Creates an in-memory database holding the fixture rows.
pub fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

/// Selects every row of `T`'s table, ordered by `order_by`.
pub fn select_all<T: Record>(queryer: &dyn Queryer, registry: &Registry, order_by: &str) -> Vec<T> {
    let mut records: Vec<T> = Vec::new();
    {
        let mut model = registry.model_sequence::<T>(&mut records).unwrap();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            model.columns("").join(", "),
            T::TABLE,
            order_by
        );
        queryer.query(&mut model, &sql).unwrap();
    }
    records
}

/// Records every statement before handing it to SQLite.
pub struct RecordingQueryer<'a> {
    inner: QueryExecutor<'a>,
    pub statements: RefCell<Vec<String>>,
}

impl<'a> RecordingQueryer<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        RecordingQueryer {
            inner: QueryExecutor::new(conn),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn statement_count(&self) -> usize {
        self.statements.borrow().len()
    }
}

impl Queryer for RecordingQueryer<'_> {
    fn query(&self, loader: &mut dyn ColumnLoader, sql: &str) -> Result<usize> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.query(loader, sql)
    }
}

/// Replays canned rows for every statement, whatever it says.
pub struct ScriptedQueryer {
    rows: Vec<Vec<(&'static str, Option<&'static str>)>>,
    pub statements: RefCell<Vec<String>>,
}

impl ScriptedQueryer {
    pub fn new(rows: Vec<Vec<(&'static str, Option<&'static str>)>>) -> Self {
        ScriptedQueryer {
            rows,
            statements: RefCell::new(Vec::new()),
        }
    }
}

impl Queryer for ScriptedQueryer {
    fn query(&self, loader: &mut dyn ColumnLoader, sql: &str) -> Result<usize> {
        self.statements.borrow_mut().push(sql.to_string());
        for row in &self.rows {
            loader.new_row()?;
            for (index, (name, value)) in row.iter().enumerate() {
                loader.load_column(index, name, value.map(str::as_bytes))?;
            }
        }
        Ok(self.rows.len())
    }
}
