use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::{Event, PageView, Session, UserAgent};

/// The database storage interface consumed by the tracker.
///
/// All `save_*` operations are append-only batch writers. `session` is the
/// read-through fallback for the session cache: the most recent session row
/// for a visitor, honouring the collapsing sign encoding.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_page_views(&self, page_views: &[PageView]) -> Result<()>;

    async fn save_sessions(&self, sessions: &[Session]) -> Result<()>;

    async fn save_events(&self, events: &[Event]) -> Result<()>;

    async fn save_user_agents(&self, user_agents: &[UserAgent]) -> Result<()>;

    /// The latest session state for (client_id, visitor_id) with
    /// `time >= not_before`, or `None` if the visitor has no live session.
    async fn session(
        &self,
        client_id: u64,
        visitor_id: u64,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Session>>;
}

/// In-memory [`Store`] keeping everything in plain vectors.
///
/// Used by the tracker test-suite and handy for local development. `fail()`
/// flips the store into an error-returning mode to exercise the at-most-once
/// write path.
#[derive(Default)]
pub struct MemStore {
    page_views: Mutex<Vec<PageView>>,
    sessions: Mutex<Vec<Session>>,
    events: Mutex<Vec<Event>>,
    user_agents: Mutex<Vec<UserAgent>>,
    fail: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until called with `false`.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub async fn page_views(&self) -> Vec<PageView> {
        self.page_views.lock().await.clone()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().await.clone()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn user_agents(&self) -> Vec<UserAgent> {
        self.user_agents.lock().await.clone()
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            Err(anyhow!("mem store writes disabled"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn save_page_views(&self, page_views: &[PageView]) -> Result<()> {
        self.check_fail()?;
        self.page_views.lock().await.extend_from_slice(page_views);
        Ok(())
    }

    async fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        self.check_fail()?;
        self.sessions.lock().await.extend_from_slice(sessions);
        Ok(())
    }

    async fn save_events(&self, events: &[Event]) -> Result<()> {
        self.check_fail()?;
        self.events.lock().await.extend_from_slice(events);
        Ok(())
    }

    async fn save_user_agents(&self, user_agents: &[UserAgent]) -> Result<()> {
        self.check_fail()?;
        self.user_agents.lock().await.extend_from_slice(user_agents);
        Ok(())
    }

    async fn session(
        &self,
        client_id: u64,
        visitor_id: u64,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        let mut latest: Option<&Session> = None;

        for session in sessions.iter() {
            if session.client_id != client_id
                || session.visitor_id != visitor_id
                || session.time < not_before
            {
                continue;
            }

            let newer = match latest {
                Some(current) => {
                    (session.time, session.sign) > (current.time, current.sign)
                }
                None => true,
            };

            if newer {
                latest = Some(session);
            }
        }

        Ok(latest.cloned())
    }
}
