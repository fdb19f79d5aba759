//! The ingestion pipeline: request guards, enrichment, the session engine
//! with its cancel/replace sign encoding, and the buffered worker pool that
//! batches writes into the store.

pub mod config;
pub mod options;
pub mod session_cache;
pub mod tracker;

mod session;
mod worker;

pub use config::TrackerConfig;
pub use options::{EventOptions, HitOptions};
pub use tracker::{Tracker, TrackerError, TrackerStats};
