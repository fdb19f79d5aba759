use std::sync::Arc;
use std::time::Duration;

use hitstream_core::geo::GeoDb;

use crate::session_cache::SessionCache;

pub const DEFAULT_WORKER_BUFFER_SIZE: usize = 100;
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_WORKER_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SESSION_CACHE_SIZE: usize = 100_000;

/// Tracker configuration. Zero values mean "use the default" and are filled
/// in by [`TrackerConfig::validate`] when the tracker is constructed.
pub struct TrackerConfig {
    /// Number of worker tasks draining the intake channel.
    /// Defaults to the number of CPUs, minimum 1.
    pub worker: usize,

    /// Records buffered per worker and table before a batch insert is issued.
    /// Defaults to 100.
    pub worker_buffer_size: usize,

    /// Maximum time between batch inserts for a worker with a non-empty
    /// buffer. Defaults to 10 seconds, capped at 60.
    pub worker_timeout: Duration,

    /// Session cache implementation. Defaults to the in-memory cache with a
    /// capacity of [`DEFAULT_SESSION_CACHE_SIZE`] entries.
    pub session_cache: Option<Arc<dyn SessionCache>>,

    /// Capacity for the default in-memory session cache. Ignored when
    /// `session_cache` is set explicitly.
    pub session_cache_size: usize,

    /// Inactivity window after which a visitor starts a new session.
    /// Defaults to 30 minutes; zero means "use the default".
    pub session_max_age: Duration,

    /// Referrer hostnames dropped from every hit unless overridden per
    /// request.
    pub referrer_domain_blacklist: Vec<String>,

    /// Match the blacklist against the registrable domain, so `example.com`
    /// also covers `www.example.com`.
    pub referrer_domain_blacklist_includes_subdomains: bool,

    /// Optional geo database. Can also be swapped at runtime through
    /// `Tracker::set_geo_db`.
    pub geo_db: Option<GeoDb>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            worker: 0,
            worker_buffer_size: 0,
            worker_timeout: Duration::ZERO,
            session_cache: None,
            session_cache_size: 0,
            session_max_age: Duration::ZERO,
            referrer_domain_blacklist: Vec::new(),
            referrer_domain_blacklist_includes_subdomains: false,
            geo_db: None,
        }
    }
}

impl TrackerConfig {
    /// Replace zero values with defaults and clamp the worker timeout.
    pub fn validate(&mut self) {
        if self.worker == 0 {
            self.worker = std::thread::available_parallelism()
                .map(|workers| workers.get())
                .unwrap_or(1);
        }

        if self.worker_buffer_size == 0 {
            self.worker_buffer_size = DEFAULT_WORKER_BUFFER_SIZE;
        }

        if self.worker_timeout.is_zero() {
            self.worker_timeout = DEFAULT_WORKER_TIMEOUT;
        } else if self.worker_timeout > MAX_WORKER_TIMEOUT {
            self.worker_timeout = MAX_WORKER_TIMEOUT;
        }

        if self.session_cache_size == 0 {
            self.session_cache_size = DEFAULT_SESSION_CACHE_SIZE;
        }

        if self.session_max_age.is_zero() {
            self.session_max_age = DEFAULT_SESSION_MAX_AGE;
        }
    }
}
