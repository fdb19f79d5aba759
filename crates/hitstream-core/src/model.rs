use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single page visit, written once per tracked hit.
///
/// All enrichment fields are plain strings with `""` meaning "unknown" —
/// a degraded lookup (geo miss, unparseable referrer) still produces a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub client_id: u64,
    pub visitor_id: u64,
    pub session_id: u32,
    pub time: DateTime<Utc>,
    /// Seconds since the previous page view of the same session, 0 for the first.
    pub duration_seconds: u32,
    pub path: String,
    pub title: String,
    pub language: String,
    pub country_code: String,
    pub city: String,
    pub referrer: String,
    pub referrer_name: String,
    pub referrer_icon: String,
    pub os: String,
    pub os_version: String,
    pub browser: String,
    pub browser_version: String,
    pub desktop: bool,
    pub mobile: bool,
    pub screen_width: u16,
    pub screen_height: u16,
    pub screen_class: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
    pub otm_source: String,
    pub otm_medium: String,
    pub otm_campaign: String,
    pub otm_position: String,
}

/// The state of a single visit, encoded for an append-only store.
///
/// A session is never updated in place. A fresh session is written with
/// `sign = 1`; each mutation appends a copy of the previous state with
/// `sign = -1` followed by the new state with `sign = 1`. The live state for
/// a (client_id, visitor_id, session_id) triple is the row set summed over
/// `sign` — the backing store collapses cancelled pairs in the background,
/// and readers aggregate with `sum(sign)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub sign: i8,
    pub client_id: u64,
    pub visitor_id: u64,
    pub session_id: u32,
    /// Time of the most recent hit. Monotonically non-decreasing per session.
    pub time: DateTime<Utc>,
    /// Time of the first hit. Fixed for the session's lifetime.
    pub start: DateTime<Utc>,
    pub duration_seconds: u32,
    pub entry_path: String,
    pub exit_path: String,
    pub page_views: u16,
    pub is_bounce: bool,
    pub entry_title: String,
    pub exit_title: String,
    pub language: String,
    pub country_code: String,
    pub city: String,
    pub referrer: String,
    pub referrer_name: String,
    pub referrer_icon: String,
    pub os: String,
    pub os_version: String,
    pub browser: String,
    pub browser_version: String,
    pub desktop: bool,
    pub mobile: bool,
    pub screen_width: u16,
    pub screen_height: u16,
    pub screen_class: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
    pub otm_source: String,
    pub otm_medium: String,
    pub otm_campaign: String,
    pub otm_position: String,
}

impl Session {
    /// Copy of this session with `sign = -1`, cancelling the persisted row.
    pub fn cancelled(&self) -> Session {
        let mut cancel = self.clone();
        cancel.sign = -1;
        cancel
    }
}

/// A custom event. Shares the session model with page views but carries a
/// name and arbitrary string metadata split into two parallel arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub client_id: u64,
    pub visitor_id: u64,
    pub session_id: u32,
    pub time: DateTime<Utc>,
    pub name: String,
    pub meta_keys: Vec<String>,
    pub meta_values: Vec<String>,
    /// Optional caller-supplied duration, used for averages in reports.
    pub duration_seconds: u32,
    pub path: String,
    pub title: String,
    pub language: String,
    pub country_code: String,
    pub city: String,
    pub referrer: String,
    pub referrer_name: String,
    pub referrer_icon: String,
    pub os: String,
    pub os_version: String,
    pub browser: String,
    pub browser_version: String,
    pub desktop: bool,
    pub mobile: bool,
    pub screen_width: u16,
    pub screen_height: u16,
    pub screen_class: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
    pub otm_source: String,
    pub otm_medium: String,
    pub otm_campaign: String,
    pub otm_position: String,
}

/// A raw User-Agent string plus its classification, written once per distinct
/// UA observed since process start. Kept for later forensic use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgent {
    pub time: DateTime<Utc>,
    pub user_agent: String,
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    pub desktop: bool,
    pub mobile: bool,
}
