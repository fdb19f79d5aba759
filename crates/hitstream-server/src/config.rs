use std::time::Duration;

use ipnet::IpNet;

/// Server configuration, loaded once at startup from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub geo_db_path: String,

    /// Per-deployment salt mixed into every visitor fingerprint.
    pub salt: String,

    /// SipHash key pair for visitor fingerprints. Required — without stable
    /// keys every restart would split all visitors.
    pub fingerprint_key0: u64,
    pub fingerprint_key1: u64,

    /// CIDRs allowed to set `X-Forwarded-For`. Empty means the socket
    /// address is always used.
    pub trusted_proxies: Vec<IpNet>,

    /// Worker pool settings; zero means "tracker default".
    pub worker: usize,
    pub worker_buffer_size: usize,
    pub worker_timeout: Duration,
    pub session_max_age: Duration,

    /// DuckDB memory limit passed to `SET memory_limit = '...'` at init.
    /// Accepts any DuckDB size string: `"512MB"`, `"1GB"`, `"4GB"`, etc.
    pub duckdb_memory_limit: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Config {
            port: std::env::var("HITSTREAM_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("HITSTREAM_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            geo_db_path: std::env::var("HITSTREAM_GEO_DB_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            salt: std::env::var("HITSTREAM_SALT")
                .map_err(|_| "HITSTREAM_SALT is required".to_string())?,
            fingerprint_key0: parse_key("HITSTREAM_FINGERPRINT_KEY0")?,
            fingerprint_key1: parse_key("HITSTREAM_FINGERPRINT_KEY1")?,
            trusted_proxies: std::env::var("HITSTREAM_TRUSTED_PROXIES")
                .map(|raw| {
                    raw.split(',')
                        .filter_map(|entry| entry.trim().parse::<IpNet>().ok())
                        .collect()
                })
                .unwrap_or_default(),
            worker: parse_or_zero("HITSTREAM_WORKER") as usize,
            worker_buffer_size: parse_or_zero("HITSTREAM_WORKER_BUFFER_SIZE") as usize,
            worker_timeout: Duration::from_secs(parse_or_zero("HITSTREAM_WORKER_TIMEOUT_SECONDS")),
            session_max_age: Duration::from_secs(parse_or_zero("HITSTREAM_SESSION_MAX_AGE_SECONDS")),
            duckdb_memory_limit: std::env::var("HITSTREAM_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
        })
    }
}

fn parse_key(name: &str) -> Result<u64, String> {
    std::env::var(name)
        .map_err(|_| format!("{name} is required"))?
        .parse()
        .map_err(|e| format!("invalid {name}: {e}"))
}

fn parse_or_zero(name: &str) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}
