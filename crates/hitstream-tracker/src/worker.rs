use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::error;

use hitstream_core::model::{Event, PageView, Session, UserAgent};
use hitstream_core::store::Store;

/// Everything a single ingest operation produces, travelling as one unit so
/// the intake capacity is counted in operations, not rows.
#[derive(Default)]
pub(crate) struct Payload {
    /// Zero, one (+1), or two (-1/+1) session rows.
    pub sessions: Vec<Session>,
    pub page_view: Option<PageView>,
    pub event: Option<Event>,
    pub user_agent: Option<UserAgent>,
}

/// N workers draining a shared bounded intake channel into per-table batch
/// inserts.
///
/// Enqueueing never blocks: when the channel is full the payload is dropped
/// and the caller counts it. Each worker owns local buffers per table and
/// flushes them when one reaches the configured size or when the flush timer
/// fires. A failed batch insert is logged and discarded — delivery is
/// at-most-once by design.
pub(crate) struct WorkerPool {
    store: Arc<dyn Store>,
    worker: usize,
    buffer_size: usize,
    timeout: Duration,
    sender: RwLock<Option<mpsc::Sender<Payload>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn Store>,
        worker: usize,
        buffer_size: usize,
        timeout: Duration,
    ) -> Self {
        WorkerPool {
            store,
            worker,
            buffer_size,
            timeout,
            sender: RwLock::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker tasks and open the intake channel.
    pub async fn start(&self) {
        let (sender, receiver) = mpsc::channel(self.worker * self.buffer_size);
        let receiver = Arc::new(Mutex::new(receiver));
        *self.sender.write().await = Some(sender);

        let mut handles = self.handles.lock().await;

        for _ in 0..self.worker {
            let store = Arc::clone(&self.store);
            let receiver = Arc::clone(&receiver);
            let buffer_size = self.buffer_size;
            let timeout = self.timeout;
            handles.push(tokio::spawn(async move {
                worker_loop(store, receiver, buffer_size, timeout).await;
            }));
        }
    }

    /// Close the intake channel and wait for every worker to drain and exit.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        drop(self.sender.write().await.take());

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().await);

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Drain all buffers synchronously by cycling the workers.
    pub async fn flush(&self) {
        self.stop().await;
        self.start().await;
    }

    /// Hand a payload to the workers. Returns false when it was dropped
    /// because the intake channel is full or closed.
    pub async fn enqueue(&self, payload: Payload) -> bool {
        let sender = match self.sender.read().await.as_ref() {
            Some(sender) => sender.clone(),
            None => return false,
        };

        sender.try_send(payload).is_ok()
    }
}

#[derive(Default)]
struct Buffers {
    page_views: Vec<PageView>,
    sessions: Vec<Session>,
    events: Vec<Event>,
    user_agents: Vec<UserAgent>,
}

impl Buffers {
    fn absorb(&mut self, payload: Payload) {
        self.sessions.extend(payload.sessions);

        if let Some(page_view) = payload.page_view {
            self.page_views.push(page_view);
        }

        if let Some(event) = payload.event {
            self.events.push(event);
        }

        if let Some(user_agent) = payload.user_agent {
            self.user_agents.push(user_agent);
        }
    }

    fn any_full(&self, buffer_size: usize) -> bool {
        self.page_views.len() >= buffer_size
            || self.sessions.len() >= buffer_size
            || self.events.len() >= buffer_size
            || self.user_agents.len() >= buffer_size
    }

    /// Issue one batch insert per non-empty table. Failed batches are logged
    /// and discarded; the buffers are cleared either way.
    async fn flush(&mut self, store: &Arc<dyn Store>) {
        if !self.page_views.is_empty() {
            if let Err(err) = store.save_page_views(&self.page_views).await {
                error!(count = self.page_views.len(), error = %err, "saving page views failed");
            }

            self.page_views.clear();
        }

        if !self.sessions.is_empty() {
            if let Err(err) = store.save_sessions(&self.sessions).await {
                error!(count = self.sessions.len(), error = %err, "saving sessions failed");
            }

            self.sessions.clear();
        }

        if !self.events.is_empty() {
            if let Err(err) = store.save_events(&self.events).await {
                error!(count = self.events.len(), error = %err, "saving events failed");
            }

            self.events.clear();
        }

        if !self.user_agents.is_empty() {
            if let Err(err) = store.save_user_agents(&self.user_agents).await {
                error!(count = self.user_agents.len(), error = %err, "saving user agents failed");
            }

            self.user_agents.clear();
        }
    }
}

async fn worker_loop(
    store: Arc<dyn Store>,
    receiver: Arc<Mutex<mpsc::Receiver<Payload>>>,
    buffer_size: usize,
    timeout: Duration,
) {
    let mut buffers = Buffers::default();
    let mut ticker = tokio::time::interval(timeout);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            received = async { receiver.lock().await.recv().await } => {
                match received {
                    Some(payload) => {
                        buffers.absorb(payload);

                        if buffers.any_full(buffer_size) {
                            buffers.flush(&store).await;
                            ticker.reset();
                        }
                    }
                    // Channel closed: drain and exit.
                    None => {
                        buffers.flush(&store).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                buffers.flush(&store).await;
            }
        }
    }
}
