/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// All four tables are append-only. `session` carries the `sign` column:
/// readers aggregate with `sum(sign)` / `HAVING sum(sign) > 0`, and a
/// periodic maintenance job may collapse cancelled pairs; neither is needed
/// for correctness.
///
/// `memory_limit` is passed at runtime from the server configuration.
/// DuckDB accepts any size string it supports — e.g. `"512MB"`, `"1GB"`.
/// An explicit limit is always set; the DuckDB default (80% of system RAM)
/// is not acceptable for a server process.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- PAGE VIEWS
-- ===========================================
CREATE TABLE IF NOT EXISTS page_view (
    client_id        UBIGINT NOT NULL,
    visitor_id       UBIGINT NOT NULL,
    session_id       UINTEGER NOT NULL,
    time             TIMESTAMP NOT NULL,
    duration_seconds UINTEGER NOT NULL DEFAULT 0,
    path             VARCHAR NOT NULL,
    title            VARCHAR,
    language         VARCHAR(10),
    country_code     VARCHAR(2),
    city             VARCHAR,
    referrer         VARCHAR,
    referrer_name    VARCHAR,
    referrer_icon    VARCHAR,
    os               VARCHAR,
    os_version       VARCHAR,
    browser          VARCHAR,
    browser_version  VARCHAR,
    desktop          BOOLEAN NOT NULL DEFAULT FALSE,
    mobile           BOOLEAN NOT NULL DEFAULT FALSE,
    screen_width     USMALLINT NOT NULL DEFAULT 0,
    screen_height    USMALLINT NOT NULL DEFAULT 0,
    screen_class     VARCHAR,
    utm_source       VARCHAR,
    utm_medium       VARCHAR,
    utm_campaign     VARCHAR,
    utm_content      VARCHAR,
    utm_term         VARCHAR,
    otm_source       VARCHAR,
    otm_medium       VARCHAR,
    otm_campaign     VARCHAR,
    otm_position     VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_page_view_client_time ON page_view(client_id, time);

-- ===========================================
-- SESSIONS (append-only, sign encoded)
-- ===========================================
CREATE TABLE IF NOT EXISTS session (
    sign             TINYINT NOT NULL,
    client_id        UBIGINT NOT NULL,
    visitor_id       UBIGINT NOT NULL,
    session_id       UINTEGER NOT NULL,
    time             TIMESTAMP NOT NULL,
    "start"          TIMESTAMP NOT NULL,
    duration_seconds UINTEGER NOT NULL DEFAULT 0,
    entry_path       VARCHAR NOT NULL,
    exit_path        VARCHAR NOT NULL,
    page_views       USMALLINT NOT NULL DEFAULT 1,
    is_bounce        BOOLEAN NOT NULL DEFAULT TRUE,
    entry_title      VARCHAR,
    exit_title       VARCHAR,
    language         VARCHAR(10),
    country_code     VARCHAR(2),
    city             VARCHAR,
    referrer         VARCHAR,
    referrer_name    VARCHAR,
    referrer_icon    VARCHAR,
    os               VARCHAR,
    os_version       VARCHAR,
    browser          VARCHAR,
    browser_version  VARCHAR,
    desktop          BOOLEAN NOT NULL DEFAULT FALSE,
    mobile           BOOLEAN NOT NULL DEFAULT FALSE,
    screen_width     USMALLINT NOT NULL DEFAULT 0,
    screen_height    USMALLINT NOT NULL DEFAULT 0,
    screen_class     VARCHAR,
    utm_source       VARCHAR,
    utm_medium       VARCHAR,
    utm_campaign     VARCHAR,
    utm_content      VARCHAR,
    utm_term         VARCHAR,
    otm_source       VARCHAR,
    otm_medium       VARCHAR,
    otm_campaign     VARCHAR,
    otm_position     VARCHAR
);
-- Optimised for the session-cache fallback lookup (latest row per visitor).
CREATE INDEX IF NOT EXISTS idx_session_visitor ON session(client_id, visitor_id, time);

-- ===========================================
-- EVENTS
-- ===========================================
-- event_meta_keys / event_meta_values hold JSON-encoded string arrays; the
-- two arrays are parallel and preserve pair order.
CREATE TABLE IF NOT EXISTS event (
    client_id         UBIGINT NOT NULL,
    visitor_id        UBIGINT NOT NULL,
    session_id        UINTEGER NOT NULL,
    time              TIMESTAMP NOT NULL,
    event_name        VARCHAR NOT NULL,
    event_meta_keys   VARCHAR,
    event_meta_values VARCHAR,
    duration_seconds  UINTEGER NOT NULL DEFAULT 0,
    path              VARCHAR NOT NULL,
    title             VARCHAR,
    language          VARCHAR(10),
    country_code      VARCHAR(2),
    city              VARCHAR,
    referrer          VARCHAR,
    referrer_name     VARCHAR,
    referrer_icon     VARCHAR,
    os                VARCHAR,
    os_version        VARCHAR,
    browser           VARCHAR,
    browser_version   VARCHAR,
    desktop           BOOLEAN NOT NULL DEFAULT FALSE,
    mobile            BOOLEAN NOT NULL DEFAULT FALSE,
    screen_width      USMALLINT NOT NULL DEFAULT 0,
    screen_height     USMALLINT NOT NULL DEFAULT 0,
    screen_class      VARCHAR,
    utm_source        VARCHAR,
    utm_medium        VARCHAR,
    utm_campaign      VARCHAR,
    utm_content       VARCHAR,
    utm_term          VARCHAR,
    otm_source        VARCHAR,
    otm_medium        VARCHAR,
    otm_campaign      VARCHAR,
    otm_position      VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_event_client_time ON event(client_id, time);

-- ===========================================
-- USER AGENTS (forensics, one row per distinct UA)
-- ===========================================
CREATE TABLE IF NOT EXISTS user_agent (
    time            TIMESTAMP NOT NULL,
    user_agent      VARCHAR NOT NULL,
    browser         VARCHAR,
    browser_version VARCHAR,
    os              VARCHAR,
    os_version      VARCHAR,
    desktop         BOOLEAN NOT NULL DEFAULT FALSE,
    mobile          BOOLEAN NOT NULL DEFAULT FALSE
);
"#
    )
}
