/// Core Module for relbind
///
/// Shared infrastructure for the mapping layer: the crate-wide error type
/// and the database collaborator boundary.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{RelbindError, Result};
