/// Query Execution Module
///
/// `QueryExecutor` runs statements on a borrowed SQLite connection and feeds
/// each result value to a [`ColumnLoader`] as the textual bytes a wire
/// protocol would carry.

use super::{format_query, ColumnLoader, ParamSource, Queryer};
use crate::core::{RelbindError, Result};
use rusqlite::{types::ValueRef, Connection};
use tracing::{debug, trace};

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    /// Executes a statement that returns no rows.
    ///
    /// # Arguments
    ///
    /// * `sql` - The SQL statement to execute
    ///
    /// # Returns
    ///
    /// The number of rows changed.
    pub fn exec(&self, sql: &str) -> Result<usize> {
        debug!("Executing statement: {}", sql);
        self.connection
            .execute(sql, [])
            .map_err(|e| RelbindError::Query(format!("Statement execution failed: {}", e)))
    }

    /// Formats `template` with `params` and runs it into `loader`.
    ///
    /// # Arguments
    ///
    /// * `loader` - Receives every result row
    /// * `template` - SQL with `?name` placeholders
    /// * `params` - Renders the placeholders, usually a `Model`
    ///
    /// # Returns
    ///
    /// The number of rows loaded.
    pub fn query_with(&self, loader: &mut dyn ColumnLoader, template: &str, params: &dyn ParamSource) -> Result<usize> {
        let sql = format_query(template, params)?;
        self.query(loader, &sql)
    }
}

impl Queryer for QueryExecutor<'_> {
    fn query(&self, loader: &mut dyn ColumnLoader, sql: &str) -> Result<usize> {
        debug!("Executing query: {}", sql);
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| RelbindError::Query(format!("Failed to prepare statement: {}", e)))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query([])
            .map_err(|e| RelbindError::Query(format!("Query execution failed: {}", e)))?;

        let mut count = 0;
        while let Some(row) = rows.next()? {
            loader.new_row()?;
            for (index, name) in columns.iter().enumerate() {
                let text;
                let raw = match row.get_ref(index)? {
                    ValueRef::Null => None,
                    ValueRef::Integer(i) => {
                        text = i.to_string();
                        Some(text.as_bytes())
                    }
                    ValueRef::Real(f) => {
                        text = f.to_string();
                        Some(text.as_bytes())
                    }
                    ValueRef::Text(t) | ValueRef::Blob(t) => Some(t),
                };
                loader.load_column(index, name, raw)?;
            }
            count += 1;
        }

        trace!("Query returned {} rows", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        rows: Vec<Vec<(String, Option<String>)>>,
    }

    impl ColumnLoader for Collect {
        fn new_row(&mut self) -> Result<()> {
            self.rows.push(Vec::new());
            Ok(())
        }

        fn load_column(&mut self, _index: usize, name: &str, raw: Option<&[u8]>) -> Result<()> {
            let value = raw.map(|raw| String::from_utf8_lossy(raw).into_owned());
            if let Some(row) = self.rows.last_mut() {
                row.push((name.to_string(), value));
            }
            Ok(())
        }
    }

    struct Id(i64);

    impl ParamSource for Id {
        fn append_param(&self, b: &mut Vec<u8>, _name: &str) -> Result<()> {
            b.extend_from_slice(self.0.to_string().as_bytes());
            Ok(())
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, score REAL, name TEXT, data BLOB);
             INSERT INTO t VALUES (1, 1.5, 'one', x'6869');
             INSERT INTO t VALUES (2, NULL, NULL, NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_values_arrive_as_wire_text() {
        let conn = setup();
        let executor = QueryExecutor::new(&conn);
        let mut collect = Collect::default();

        let count = executor.query(&mut collect, "SELECT id, score, name, data FROM t ORDER BY id").unwrap();
        assert_eq!(count, 2);

        let first: Vec<_> = collect.rows[0].iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(
            first,
            vec![
                Some("1".to_string()),
                Some("1.5".to_string()),
                Some("one".to_string()),
                Some("hi".to_string()),
            ]
        );
        assert!(collect.rows[1][1..].iter().all(|(_, v)| v.is_none()));
        assert_eq!(collect.rows[0][2].0, "name");
    }

    #[test]
    fn test_query_with_params() {
        let conn = setup();
        let executor = QueryExecutor::new(&conn);
        let mut collect = Collect::default();

        let count = executor.query_with(&mut collect, "SELECT name FROM t WHERE id = ?id", &Id(1)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(collect.rows[0][0].1.as_deref(), Some("one"));
    }

    #[test]
    fn test_scalar_collection() {
        let conn = Connection::open_in_memory().unwrap();
        let executor = QueryExecutor::new(&conn);

        let mut ids: Vec<i64> = Vec::new();
        let count = executor
            .query(&mut ids, "WITH data (id) AS (VALUES (1), (2), (3)) SELECT id FROM data")
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(ids, vec![1, 2, 3]);

        let conn = setup();
        let executor = QueryExecutor::new(&conn);
        let mut names: Vec<Option<String>> = Vec::new();
        executor.query(&mut names, "SELECT name FROM t ORDER BY id").unwrap();
        assert_eq!(names, vec![Some("one".to_string()), None]);
    }

    #[test]
    fn test_invalid_sql() {
        let conn = setup();
        let executor = QueryExecutor::new(&conn);
        let mut collect = Collect::default();

        match executor.query(&mut collect, "SELEC nonsense") {
            Err(RelbindError::Query(msg)) => assert!(msg.contains("Failed to prepare statement")),
            other => panic!("Expected Query error, got {:?}", other.map(|_| ())),
        }
        assert!(executor.exec("DELETE FROM missing").is_err());
        assert_eq!(executor.exec("DELETE FROM t WHERE id = 2").unwrap(), 1);
    }
}
