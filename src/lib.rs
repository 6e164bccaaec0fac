// Core infrastructure modules
pub mod config;
pub mod core;

// Mapping layer
pub mod orm;
pub mod types;

pub use crate::core::{RelbindError, Result};
pub use crate::orm::{Loader, Model, Record, Registry};
