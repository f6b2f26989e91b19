//! # screenlint-store
//!
//! Persistence contract of the pipeline. The core never sees a schema: it finds
//! and saves entities through [`Repository`]. [`InMemoryStore`] backs the CLI and
//! the tests and can export a JSON report.

mod memory;
mod repository;

pub use memory::{InMemoryStore, StoreSnapshot};
pub use repository::Repository;
