/// Database Module
///
/// The mapping layer never talks to a driver directly. It goes through three
/// small collaborator traits defined here:
///
/// - [`ColumnLoader`]: receives result rows one column at a time
/// - [`Queryer`]: executes a statement and feeds its rows to a `ColumnLoader`
/// - [`ParamSource`]: renders a named parameter as a SQL literal
///
/// The submodules provide the SQLite side of that boundary:
/// - **Connection Setup** (`connection.rs`): opening connections and applying pragmas
/// - **Query Execution** (`query.rs`): `QueryExecutor`, a `Queryer` over `rusqlite`
/// - **Parameter Formatting** (`format.rs`): `?name` placeholder substitution
use crate::core::Result;

pub mod connection;
pub mod format;
pub mod query;

pub use connection::*;
pub use format::*;
pub use query::*;

/// Sink for result rows.
pub trait ColumnLoader {
    /// Called once before the columns of each row.
    fn new_row(&mut self) -> Result<()>;

    /// Receives the raw wire bytes of column `index`; `None` is SQL `NULL`.
    fn load_column(&mut self, index: usize, name: &str, raw: Option<&[u8]>) -> Result<()>;
}

/// Statement execution service.
pub trait Queryer {
    /// Runs `sql`, streaming every row into `loader`, and returns the row count.
    fn query(&self, loader: &mut dyn ColumnLoader, sql: &str) -> Result<usize>;
}

/// Source of named statement parameters.
pub trait ParamSource {
    /// Appends the quoted SQL literal for `name` to `b`.
    fn append_param(&self, b: &mut Vec<u8>, name: &str) -> Result<()>;
}
