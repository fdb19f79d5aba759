//! DuckDB implementation of the storage interface: append-only batch writers
//! for the four analytics tables and the session fallback query.

pub mod backend;
pub mod schema;

pub use backend::DuckDbStore;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `hitstream_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
