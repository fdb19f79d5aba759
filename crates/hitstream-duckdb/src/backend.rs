use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use hitstream_core::model::{Event, PageView, Session, UserAgent};
use hitstream_core::store::Store;

use crate::schema::init_sql;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// DuckDB-backed [`Store`].
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. The connection is wrapped in `Arc<tokio::sync::Mutex<_>>`
/// so the async runtime serialises all access while the struct stays cheap to
/// clone and share.
///
/// All writers are append-only; session mutation happens through the sign
/// pairs the tracker emits, never through UPDATE.
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open (or create) a DuckDB database file at `path` and initialise the
    /// schema. The memory limit is applied at this point.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening DuckDB database {path}"))?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(path, memory_limit, "DuckDB store opened");
        Ok(DuckDbStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database. Intended for tests — data is
    /// discarded when the struct is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("256MB"))?;
        Ok(DuckDbStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Raw connection access for integration tests.
    #[doc(hidden)]
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Run `f` inside a transaction, rolling back on error. One fsync per batch
/// instead of one per row.
fn in_transaction(conn: &Connection, f: impl FnOnce(&Connection) -> Result<()>) -> Result<()> {
    conn.execute_batch("BEGIN TRANSACTION")?;

    match f(conn) {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

fn fmt_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Parse a timestamp read back as VARCHAR, mapping failures onto the duckdb
/// error type so this can run inside a row-mapping closure.
fn parse_time_column(index: usize, raw: &str) -> duckdb::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|err| {
            duckdb::Error::FromSqlConversionFailure(index, duckdb::types::Type::Text, Box::new(err))
        })
}

#[async_trait]
impl Store for DuckDbStore {
    async fn save_page_views(&self, page_views: &[PageView]) -> Result<()> {
        if page_views.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        in_transaction(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"INSERT INTO page_view (
                    client_id, visitor_id, session_id, time, duration_seconds,
                    path, title, language, country_code, city,
                    referrer, referrer_name, referrer_icon,
                    os, os_version, browser, browser_version, desktop, mobile,
                    screen_width, screen_height, screen_class,
                    utm_source, utm_medium, utm_campaign, utm_content, utm_term,
                    otm_source, otm_medium, otm_campaign, otm_position
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19,
                    ?20, ?21, ?22,
                    ?23, ?24, ?25, ?26, ?27,
                    ?28, ?29, ?30, ?31
                )"#,
            )?;

            for page_view in page_views {
                stmt.execute(duckdb::params![
                    page_view.client_id,
                    page_view.visitor_id,
                    page_view.session_id,
                    fmt_time(&page_view.time),
                    page_view.duration_seconds,
                    page_view.path,
                    page_view.title,
                    page_view.language,
                    page_view.country_code,
                    page_view.city,
                    page_view.referrer,
                    page_view.referrer_name,
                    page_view.referrer_icon,
                    page_view.os,
                    page_view.os_version,
                    page_view.browser,
                    page_view.browser_version,
                    page_view.desktop,
                    page_view.mobile,
                    page_view.screen_width,
                    page_view.screen_height,
                    page_view.screen_class,
                    page_view.utm_source,
                    page_view.utm_medium,
                    page_view.utm_campaign,
                    page_view.utm_content,
                    page_view.utm_term,
                    page_view.otm_source,
                    page_view.otm_medium,
                    page_view.otm_campaign,
                    page_view.otm_position,
                ])?;
            }

            Ok(())
        })
    }

    async fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        if sessions.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        in_transaction(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"INSERT INTO session (
                    sign, client_id, visitor_id, session_id, time, "start",
                    duration_seconds, entry_path, exit_path, page_views, is_bounce,
                    entry_title, exit_title, language, country_code, city,
                    referrer, referrer_name, referrer_icon,
                    os, os_version, browser, browser_version, desktop, mobile,
                    screen_width, screen_height, screen_class,
                    utm_source, utm_medium, utm_campaign, utm_content, utm_term,
                    otm_source, otm_medium, otm_campaign, otm_position
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19,
                    ?20, ?21, ?22, ?23, ?24, ?25,
                    ?26, ?27, ?28,
                    ?29, ?30, ?31, ?32, ?33,
                    ?34, ?35, ?36, ?37
                )"#,
            )?;

            for session in sessions {
                stmt.execute(duckdb::params![
                    session.sign,
                    session.client_id,
                    session.visitor_id,
                    session.session_id,
                    fmt_time(&session.time),
                    fmt_time(&session.start),
                    session.duration_seconds,
                    session.entry_path,
                    session.exit_path,
                    session.page_views,
                    session.is_bounce,
                    session.entry_title,
                    session.exit_title,
                    session.language,
                    session.country_code,
                    session.city,
                    session.referrer,
                    session.referrer_name,
                    session.referrer_icon,
                    session.os,
                    session.os_version,
                    session.browser,
                    session.browser_version,
                    session.desktop,
                    session.mobile,
                    session.screen_width,
                    session.screen_height,
                    session.screen_class,
                    session.utm_source,
                    session.utm_medium,
                    session.utm_campaign,
                    session.utm_content,
                    session.utm_term,
                    session.otm_source,
                    session.otm_medium,
                    session.otm_campaign,
                    session.otm_position,
                ])?;
            }

            Ok(())
        })
    }

    async fn save_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        in_transaction(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"INSERT INTO event (
                    client_id, visitor_id, session_id, time,
                    event_name, event_meta_keys, event_meta_values, duration_seconds,
                    path, title, language, country_code, city,
                    referrer, referrer_name, referrer_icon,
                    os, os_version, browser, browser_version, desktop, mobile,
                    screen_width, screen_height, screen_class,
                    utm_source, utm_medium, utm_campaign, utm_content, utm_term,
                    otm_source, otm_medium, otm_campaign, otm_position
                ) VALUES (
                    ?1, ?2, ?3, ?4,
                    ?5, ?6, ?7, ?8,
                    ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22,
                    ?23, ?24, ?25,
                    ?26, ?27, ?28, ?29, ?30,
                    ?31, ?32, ?33, ?34
                )"#,
            )?;

            for event in events {
                // The parallel arrays are stored JSON-encoded.
                let meta_keys = serde_json::to_string(&event.meta_keys)?;
                let meta_values = serde_json::to_string(&event.meta_values)?;

                stmt.execute(duckdb::params![
                    event.client_id,
                    event.visitor_id,
                    event.session_id,
                    fmt_time(&event.time),
                    event.name,
                    meta_keys,
                    meta_values,
                    event.duration_seconds,
                    event.path,
                    event.title,
                    event.language,
                    event.country_code,
                    event.city,
                    event.referrer,
                    event.referrer_name,
                    event.referrer_icon,
                    event.os,
                    event.os_version,
                    event.browser,
                    event.browser_version,
                    event.desktop,
                    event.mobile,
                    event.screen_width,
                    event.screen_height,
                    event.screen_class,
                    event.utm_source,
                    event.utm_medium,
                    event.utm_campaign,
                    event.utm_content,
                    event.utm_term,
                    event.otm_source,
                    event.otm_medium,
                    event.otm_campaign,
                    event.otm_position,
                ])?;
            }

            Ok(())
        })
    }

    async fn save_user_agents(&self, user_agents: &[UserAgent]) -> Result<()> {
        if user_agents.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().await;
        in_transaction(&conn, |conn| {
            let mut stmt = conn.prepare(
                r#"INSERT INTO user_agent (
                    time, user_agent, browser, browser_version,
                    os, os_version, desktop, mobile
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            )?;

            for user_agent in user_agents {
                stmt.execute(duckdb::params![
                    fmt_time(&user_agent.time),
                    user_agent.user_agent,
                    user_agent.browser,
                    user_agent.browser_version,
                    user_agent.os,
                    user_agent.os_version,
                    user_agent.desktop,
                    user_agent.mobile,
                ])?;
            }

            Ok(())
        })
    }

    async fn session(
        &self,
        client_id: u64,
        visitor_id: u64,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT sign, client_id, visitor_id, session_id,
                CAST(time AS VARCHAR), CAST("start" AS VARCHAR),
                duration_seconds, entry_path, exit_path, page_views, is_bounce,
                entry_title, exit_title, language, country_code, city,
                referrer, referrer_name, referrer_icon,
                os, os_version, browser, browser_version, desktop, mobile,
                screen_width, screen_height, screen_class,
                utm_source, utm_medium, utm_campaign, utm_content, utm_term,
                otm_source, otm_medium, otm_campaign, otm_position
            FROM session
            WHERE client_id = ?1 AND visitor_id = ?2 AND time >= ?3
            ORDER BY time DESC, sign DESC
            LIMIT 1"#,
        )?;

        let row = stmt.query_row(
            duckdb::params![client_id, visitor_id, fmt_time(&not_before)],
            |row| {
                let text = |index: usize| -> duckdb::Result<String> {
                    Ok(row.get::<_, Option<String>>(index)?.unwrap_or_default())
                };

                Ok(Session {
                    sign: row.get(0)?,
                    client_id: row.get(1)?,
                    visitor_id: row.get(2)?,
                    session_id: row.get(3)?,
                    time: parse_time_column(4, &row.get::<_, String>(4)?)?,
                    start: parse_time_column(5, &row.get::<_, String>(5)?)?,
                    duration_seconds: row.get(6)?,
                    entry_path: row.get(7)?,
                    exit_path: row.get(8)?,
                    page_views: row.get(9)?,
                    is_bounce: row.get(10)?,
                    entry_title: text(11)?,
                    exit_title: text(12)?,
                    language: text(13)?,
                    country_code: text(14)?,
                    city: text(15)?,
                    referrer: text(16)?,
                    referrer_name: text(17)?,
                    referrer_icon: text(18)?,
                    os: text(19)?,
                    os_version: text(20)?,
                    browser: text(21)?,
                    browser_version: text(22)?,
                    desktop: row.get(23)?,
                    mobile: row.get(24)?,
                    screen_width: row.get(25)?,
                    screen_height: row.get(26)?,
                    screen_class: text(27)?,
                    utm_source: text(28)?,
                    utm_medium: text(29)?,
                    utm_campaign: text(30)?,
                    utm_content: text(31)?,
                    utm_term: text(32)?,
                    otm_source: text(33)?,
                    otm_medium: text(34)?,
                    otm_campaign: text(35)?,
                    otm_position: text(36)?,
                })
            },
        );

        match row {
            Ok(session) => Ok(Some(session)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
