use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use hitstream_core::model::Session;

use crate::session_cache::SessionCache;

/// Number of per-key locks. Two concurrent hits from the same visitor must
/// not both observe "no session" and mint two session ids, so the engine
/// serialises its read-modify-write per (client_id, visitor_id) through a
/// fixed pool of sharded mutexes.
const SHARD_COUNT: usize = 64;

/// What kind of record is driving a session update. Page views count and
/// persist session rows; custom events only extend the session's lifetime in
/// the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionInput {
    PageView,
    Event,
}

/// Result of running a hit through the session engine.
pub(crate) struct SessionUpdate {
    /// Sign rows that must be persisted: one `+1` row for a fresh session, a
    /// `(-1, +1)` cancel/replace pair for a continued one, or empty when
    /// nothing has to reach the store.
    pub rows: Vec<Session>,
    /// The new cached state.
    pub session: Session,
    /// `time` of the previous persisted state. `None` for a fresh session
    /// and for the page view that promotes an event-created one — in both
    /// cases it is the session's first page view.
    pub previous_time: Option<DateTime<Utc>>,
}

/// Decides whether a hit starts a new session or continues an existing one,
/// and produces the sign rows that encode the transition on an append-only
/// store.
///
/// Cached state created by an event carries `sign = 0`: no row for it was
/// ever persisted, so there is nothing to cancel. The first page view of such
/// a session promotes it by emitting a lone `+1` row; emitting the usual
/// cancel/replace pair instead would sum the session to zero and hide it from
/// every report.
pub(crate) struct SessionEngine {
    cache: Arc<dyn SessionCache>,
    max_age: chrono::Duration,
    shards: Vec<Mutex<()>>,
}

impl SessionEngine {
    pub fn new(cache: Arc<dyn SessionCache>, max_age: std::time::Duration) -> Self {
        SessionEngine {
            cache,
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn SessionCache> {
        &self.cache
    }

    /// Run one hit through the engine.
    ///
    /// `template` is the fully enriched state the session would have if this
    /// were its first page view (sign +1, `time == start`, page_views 1). For
    /// a continuation only path, title, time, and the counters change; the
    /// enrichment captured at session start is preserved.
    pub async fn process(&self, mut template: Session, input: SessionInput) -> SessionUpdate {
        let client_id = template.client_id;
        let visitor_id = template.visitor_id;
        let now = template.time;
        let _guard = self.shard(client_id, visitor_id).lock().await;

        let previous = self
            .cache
            .get(client_id, visitor_id, now - self.max_age)
            .await;

        match previous {
            None => {
                template.session_id = random_session_id();

                if input == SessionInput::Event {
                    // Event-only session: nothing reaches the store, so mark
                    // the cached state accordingly and count no page view.
                    template.sign = 0;
                    template.page_views = 0;
                }

                self.cache.put(template.clone()).await;

                let rows = match input {
                    SessionInput::PageView => vec![template.clone()],
                    SessionInput::Event => Vec::new(),
                };

                SessionUpdate {
                    rows,
                    session: template,
                    previous_time: None,
                }
            }
            Some(previous) => {
                let mut current = previous.clone();
                current.time = now;
                current.exit_path = template.exit_path;
                current.exit_title = template.exit_title;
                current.duration_seconds = seconds_between(previous.start, now);

                let rows = match input {
                    SessionInput::PageView => {
                        current.sign = 1;
                        current.page_views += 1;
                        current.is_bounce = current.page_views == 1;

                        if previous.sign == 1 {
                            vec![previous.cancelled(), current.clone()]
                        } else {
                            // The previous state never reached the store;
                            // there is no row to cancel.
                            vec![current.clone()]
                        }
                    }
                    SessionInput::Event => Vec::new(),
                };

                self.cache.put(current.clone()).await;

                SessionUpdate {
                    rows,
                    session: current,
                    previous_time: (previous.sign == 1).then_some(previous.time),
                }
            }
        }
    }

    /// Refresh a live session's `time` and duration without touching paths or
    /// counters. Returns `None` when the visitor has no session at all; for a
    /// session that was never persisted only the cache is refreshed.
    pub async fn extend(
        &self,
        client_id: u64,
        visitor_id: u64,
        now: DateTime<Utc>,
    ) -> Option<SessionUpdate> {
        let _guard = self.shard(client_id, visitor_id).lock().await;

        let previous = self
            .cache
            .get(client_id, visitor_id, now - self.max_age)
            .await?;

        let mut current = previous.clone();
        current.time = now;
        current.duration_seconds = seconds_between(previous.start, now);

        let rows = if previous.sign == 1 {
            vec![previous.cancelled(), current.clone()]
        } else {
            Vec::new()
        };

        self.cache.put(current.clone()).await;

        Some(SessionUpdate {
            rows,
            session: current,
            previous_time: Some(previous.time),
        })
    }

    fn shard(&self, client_id: u64, visitor_id: u64) -> &Mutex<()> {
        let index = (client_id ^ visitor_id) as usize % SHARD_COUNT;
        &self.shards[index]
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    (end - start).num_seconds().max(0) as u32
}

/// Random non-zero session id from the thread-local CSPRNG. A collision
/// within one cache window is astronomically unlikely and not handled.
fn random_session_id() -> u32 {
    let mut rng = rand::thread_rng();

    loop {
        let id: u32 = rng.gen();

        if id != 0 {
            return id;
        }
    }
}
