use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use hitstream_core::model::Session;
use hitstream_core::store::Store;

/// Cache for the most recent session state per (client_id, visitor_id).
///
/// The cache is a performance aid, not a source of truth: implementations
/// fall back to the store on a miss so sessions survive process restarts.
///
/// Entries created by custom events carry `sign = 0` until a page view
/// promotes them — that state exists only here, never in the store.
/// Implementations must hand entries back unchanged.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// The visitor's session iff its `time` is at least `not_before`.
    async fn get(
        &self,
        client_id: u64,
        visitor_id: u64,
        not_before: DateTime<Utc>,
    ) -> Option<Session>;

    /// Insert or overwrite the visitor's session state.
    async fn put(&self, session: Session);

    async fn clear(&self);
}

/// Bounded in-memory [`SessionCache`] backed by a read-through store lookup.
///
/// When the map outgrows `max_sessions`, entries older than the session
/// max-age are evicted first; if that is not enough, the oldest entries go
/// until the map fits again.
pub struct MemSessionCache {
    store: Arc<dyn Store>,
    max_sessions: usize,
    max_age: chrono::Duration,
    sessions: RwLock<HashMap<(u64, u64), Session>>,
}

impl MemSessionCache {
    pub fn new(store: Arc<dyn Store>, max_sessions: usize, max_age: std::time::Duration) -> Self {
        MemSessionCache {
            store,
            max_sessions: max_sessions.max(1),
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionCache for MemSessionCache {
    async fn get(
        &self,
        client_id: u64,
        visitor_id: u64,
        not_before: DateTime<Utc>,
    ) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;

            if let Some(session) = sessions.get(&(client_id, visitor_id)) {
                if session.time >= not_before {
                    return Some(session.clone());
                }

                return None;
            }
        }

        match self.store.session(client_id, visitor_id, not_before).await {
            Ok(session) => session,
            Err(error) => {
                debug!(client_id, visitor_id, %error, "session store lookup failed");
                None
            }
        }
    }

    async fn put(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert((session.client_id, session.visitor_id), session);

        if sessions.len() <= self.max_sessions {
            return;
        }

        let deadline = Utc::now() - self.max_age;
        sessions.retain(|_, session| session.time >= deadline);

        while sessions.len() > self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.time)
                .map(|(key, _)| *key);

            match oldest {
                Some(key) => sessions.remove(&key),
                None => break,
            };
        }
    }

    async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}
