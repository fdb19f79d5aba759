use ipnet::IpNet;

use hitstream_tracker::Tracker;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    pub tracker: Tracker,

    /// CIDRs whose `X-Forwarded-For` header is trusted when resolving the
    /// client IP.
    pub trusted_proxies: Vec<IpNet>,
}

impl AppState {
    pub fn new(tracker: Tracker, trusted_proxies: Vec<IpNet>) -> Self {
        AppState {
            tracker,
            trusted_proxies,
        }
    }
}
