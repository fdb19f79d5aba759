use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use hitstream_core::campaign::{OtmParams, UtmParams};
use hitstream_core::fingerprint::{fingerprint, fingerprint_keys, FingerprintKeys};
use hitstream_core::geo::GeoDb;
use hitstream_core::model::{Event, PageView, Session, UserAgent};
use hitstream_core::referrer::{ignore_referrer, resolve_referrer, AndroidAppResolver, Referrer};
use hitstream_core::request::IngestRequest;
use hitstream_core::screen::screen_class;
use hitstream_core::store::Store;
use hitstream_core::ua::{parse_user_agent, UserAgentInfo};

use crate::config::TrackerConfig;
use crate::options::{EventOptions, HitOptions};
use crate::session::{SessionEngine, SessionInput};
use crate::session_cache::{MemSessionCache, SessionCache};
use crate::worker::{Payload, WorkerPool};

#[derive(Debug, Error)]
pub enum TrackerError {
    /// `set_fingerprint_keys` must run before the first tracker is built.
    #[error("fingerprint keys are not set")]
    FingerprintKeysUnset,
}

/// Ingest counters. Nothing ever propagates to the caller of `hit`/`event`;
/// these and the logs are the only observability surface.
#[derive(Debug, Default)]
pub struct TrackerStats {
    ignored: AtomicU64,
    dropped: AtomicU64,
}

impl TrackerStats {
    /// Requests rejected by an input guard (bot, missing UA, spam referrer,
    /// non-GET, DNT, blank event name).
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Records discarded because the worker intake was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The ingestion pipeline: request guards, enrichment, session continuity,
/// and buffered persistence.
///
/// `hit` and `event` never block the calling handler beyond the inline
/// enrichment work — records are handed to a bounded worker pool and either
/// batch-inserted or dropped under backpressure.
pub struct Tracker {
    salt: String,
    keys: FingerprintKeys,
    referrer_domain_blacklist: Vec<String>,
    referrer_domain_blacklist_includes_subdomains: bool,
    engine: SessionEngine,
    pool: WorkerPool,
    geo_db: RwLock<Option<GeoDb>>,
    android_apps: AndroidAppResolver,
    seen_user_agents: Mutex<HashSet<String>>,
    stats: TrackerStats,
    stopped: AtomicBool,
}

impl Tracker {
    /// Build a tracker and spawn its workers.
    ///
    /// `salt` is mixed into every visitor fingerprint, separating tenants
    /// that share one deployment. Fails if the process-wide fingerprint keys
    /// have not been set.
    pub async fn new(
        store: Arc<dyn Store>,
        salt: impl Into<String>,
        config: Option<TrackerConfig>,
    ) -> Result<Tracker, TrackerError> {
        let keys = fingerprint_keys().ok_or(TrackerError::FingerprintKeysUnset)?;

        let mut config = config.unwrap_or_default();
        config.validate();

        let cache: Arc<dyn SessionCache> = match config.session_cache.take() {
            Some(cache) => cache,
            None => Arc::new(MemSessionCache::new(
                Arc::clone(&store),
                config.session_cache_size,
                config.session_max_age,
            )),
        };

        let tracker = Tracker {
            engine: SessionEngine::new(cache, config.session_max_age),
            pool: WorkerPool::new(
                store,
                config.worker,
                config.worker_buffer_size,
                config.worker_timeout,
            ),
            salt: salt.into(),
            keys,
            referrer_domain_blacklist: config.referrer_domain_blacklist,
            referrer_domain_blacklist_includes_subdomains: config
                .referrer_domain_blacklist_includes_subdomains,
            geo_db: RwLock::new(config.geo_db),
            android_apps: AndroidAppResolver::new(),
            seen_user_agents: Mutex::new(HashSet::new()),
            stats: TrackerStats::default(),
            stopped: AtomicBool::new(false),
        };

        tracker.pool.start().await;
        Ok(tracker)
    }

    /// Track a page view. Silently drops ignored requests; never fails.
    pub async fn hit(&self, req: &IngestRequest, options: Option<HitOptions>) {
        let ua_info = match self.check(req) {
            Some(ua_info) => ua_info,
            None => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let options = self.merge_options(options);
        let enriched = self.enrich(req, &options, &ua_info).await;
        let update = self
            .engine
            .process(enriched.session_template, SessionInput::PageView)
            .await;

        let now = update.session.time;
        let page_view = PageView {
            client_id: update.session.client_id,
            visitor_id: update.session.visitor_id,
            session_id: update.session.session_id,
            time: now,
            duration_seconds: update
                .previous_time
                .map(|previous| (now - previous).num_seconds().max(0) as u32)
                .unwrap_or(0),
            path: enriched.path,
            title: options.title.clone(),
            language: enriched.language,
            country_code: enriched.country_code,
            city: enriched.city,
            referrer: enriched.referrer.url,
            referrer_name: enriched.referrer.name,
            referrer_icon: enriched.referrer.icon,
            os: ua_info.os.clone(),
            os_version: ua_info.os_version.clone(),
            browser: ua_info.browser.clone(),
            browser_version: ua_info.browser_version.clone(),
            desktop: ua_info.desktop,
            mobile: ua_info.mobile,
            screen_width: options.screen_width,
            screen_height: options.screen_height,
            screen_class: screen_class(options.screen_width).to_string(),
            utm_source: enriched.utm.source,
            utm_medium: enriched.utm.medium,
            utm_campaign: enriched.utm.campaign,
            utm_content: enriched.utm.content,
            utm_term: enriched.utm.term,
            otm_source: enriched.otm.source,
            otm_medium: enriched.otm.medium,
            otm_campaign: enriched.otm.campaign,
            otm_position: enriched.otm.position,
        };

        let user_agent = self.dedup_user_agent(req, &ua_info, now).await;
        self.enqueue(Payload {
            sessions: update.rows,
            page_view: Some(page_view),
            event: None,
            user_agent,
        })
        .await;
    }

    /// Track a custom event. Events share the session model with page views
    /// but only persist the event record itself.
    pub async fn event(
        &self,
        req: &IngestRequest,
        event_options: EventOptions,
        options: Option<HitOptions>,
    ) {
        let name = event_options.name.trim().to_string();

        if name.is_empty() {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let ua_info = match self.check(req) {
            Some(ua_info) => ua_info,
            None => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let options = self.merge_options(options);
        let enriched = self.enrich(req, &options, &ua_info).await;

        // Events extend the session (the cache keeps continuity with page
        // views) but do not count as page views; the engine emits no session
        // rows for them.
        let update = self
            .engine
            .process(enriched.session_template, SessionInput::Event)
            .await;

        let (meta_keys, meta_values) = event_options.meta_data();
        let event = Event {
            client_id: update.session.client_id,
            visitor_id: update.session.visitor_id,
            session_id: update.session.session_id,
            time: update.session.time,
            name,
            meta_keys,
            meta_values,
            duration_seconds: event_options.duration,
            path: enriched.path,
            title: options.title.clone(),
            language: enriched.language,
            country_code: enriched.country_code,
            city: enriched.city,
            referrer: enriched.referrer.url,
            referrer_name: enriched.referrer.name,
            referrer_icon: enriched.referrer.icon,
            os: ua_info.os.clone(),
            os_version: ua_info.os_version.clone(),
            browser: ua_info.browser.clone(),
            browser_version: ua_info.browser_version.clone(),
            desktop: ua_info.desktop,
            mobile: ua_info.mobile,
            screen_width: options.screen_width,
            screen_height: options.screen_height,
            screen_class: screen_class(options.screen_width).to_string(),
            utm_source: enriched.utm.source,
            utm_medium: enriched.utm.medium,
            utm_campaign: enriched.utm.campaign,
            utm_content: enriched.utm.content,
            utm_term: enriched.utm.term,
            otm_source: enriched.otm.source,
            otm_medium: enriched.otm.medium,
            otm_campaign: enriched.otm.campaign,
            otm_position: enriched.otm.position,
        };

        self.enqueue(Payload {
            sessions: update.rows,
            event: Some(event),
            ..Default::default()
        })
        .await;
    }

    /// Keep a visitor's session alive without counting a page view. Emits the
    /// cancel/replace pair with only `time` and duration changed; a no-op
    /// when the visitor has no live session.
    pub async fn extend_session(&self, req: &IngestRequest, client_id: u64) {
        let user_agent = req.user_agent.trim();

        if user_agent.is_empty() {
            return;
        }

        let now = Utc::now();
        let visitor_id = fingerprint(self.keys, &self.salt, user_agent, &req.remote_ip, now);

        if let Some(update) = self.engine.extend(client_id, visitor_id, now).await {
            if !update.rows.is_empty() {
                self.enqueue(Payload {
                    sessions: update.rows,
                    ..Default::default()
                })
                .await;
            }
        }
    }

    /// Drain all worker buffers synchronously.
    pub async fn flush(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        self.pool.flush().await;
    }

    /// Close intake, drain the workers, and return once every pending batch
    /// has been written or failed. Idempotent.
    pub async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.pool.stop().await;
        }
    }

    /// Swap the geo database at runtime, e.g. after a scheduled re-download.
    pub async fn set_geo_db(&self, geo_db: GeoDb) {
        *self.geo_db.write().await = Some(geo_db);
    }

    pub async fn clear_session_cache(&self) {
        self.engine.cache().clear().await;
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Apply the input guards. Returns the parsed UA for requests that should
    /// be tracked, `None` for everything that must be dropped silently.
    fn check(&self, req: &IngestRequest) -> Option<UserAgentInfo> {
        if req.method != "GET" {
            return None;
        }

        if req.dnt == "1" {
            return None;
        }

        if req.user_agent.trim().is_empty() {
            return None;
        }

        if ignore_referrer(req) {
            return None;
        }

        parse_user_agent(&req.user_agent)
    }

    fn merge_options(&self, options: Option<HitOptions>) -> HitOptions {
        let mut options = options.unwrap_or_default();

        if options.referrer_domain_blacklist.is_empty() {
            options.referrer_domain_blacklist = self.referrer_domain_blacklist.clone();
            options.referrer_domain_blacklist_includes_subdomains =
                self.referrer_domain_blacklist_includes_subdomains;
        }

        options
    }

    async fn enrich(
        &self,
        req: &IngestRequest,
        options: &HitOptions,
        ua_info: &UserAgentInfo,
    ) -> Enriched {
        let now = Utc::now();
        let visitor_id = fingerprint(
            self.keys,
            &self.salt,
            req.user_agent.trim(),
            &req.remote_ip,
            now,
        );

        let (country_code, city) = match self.geo_db.read().await.as_ref() {
            Some(geo_db) => geo_db.country_code_and_city(&req.remote_ip),
            None => (String::new(), String::new()),
        };

        let referrer = resolve_referrer(
            req,
            &options.referrer,
            &options.referrer_domain_blacklist,
            options.referrer_domain_blacklist_includes_subdomains,
            &self.android_apps,
        )
        .await;

        let utm = UtmParams::from_request(req);
        let otm = OtmParams::from_request(req);
        let language = req.language();
        let path = options.path(req);

        let session_template = Session {
            sign: 1,
            client_id: options.client_id,
            visitor_id,
            session_id: 0,
            time: now,
            start: now,
            duration_seconds: 0,
            entry_path: path.clone(),
            exit_path: path.clone(),
            page_views: 1,
            is_bounce: true,
            entry_title: options.title.clone(),
            exit_title: options.title.clone(),
            language: language.clone(),
            country_code: country_code.clone(),
            city: city.clone(),
            referrer: referrer.url.clone(),
            referrer_name: referrer.name.clone(),
            referrer_icon: referrer.icon.clone(),
            os: ua_info.os.clone(),
            os_version: ua_info.os_version.clone(),
            browser: ua_info.browser.clone(),
            browser_version: ua_info.browser_version.clone(),
            desktop: ua_info.desktop,
            mobile: ua_info.mobile,
            screen_width: options.screen_width,
            screen_height: options.screen_height,
            screen_class: screen_class(options.screen_width).to_string(),
            utm_source: utm.source.clone(),
            utm_medium: utm.medium.clone(),
            utm_campaign: utm.campaign.clone(),
            utm_content: utm.content.clone(),
            utm_term: utm.term.clone(),
            otm_source: otm.source.clone(),
            otm_medium: otm.medium.clone(),
            otm_campaign: otm.campaign.clone(),
            otm_position: otm.position.clone(),
        };

        Enriched {
            path,
            language,
            country_code,
            city,
            referrer,
            utm,
            otm,
            session_template,
        }
    }

    /// The UserAgent row for this request, or `None` if this exact UA string
    /// was already observed since startup.
    async fn dedup_user_agent(
        &self,
        req: &IngestRequest,
        ua_info: &UserAgentInfo,
        now: chrono::DateTime<Utc>,
    ) -> Option<UserAgent> {
        let mut seen = self.seen_user_agents.lock().await;

        if !seen.insert(req.user_agent.clone()) {
            return None;
        }

        Some(UserAgent {
            time: now,
            user_agent: req.user_agent.clone(),
            browser: ua_info.browser.clone(),
            browser_version: ua_info.browser_version.clone(),
            os: ua_info.os.clone(),
            os_version: ua_info.os_version.clone(),
            desktop: ua_info.desktop,
            mobile: ua_info.mobile,
        })
    }

    async fn enqueue(&self, payload: Payload) {
        if !self.pool.enqueue(payload).await {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("ingest payload dropped, worker intake full or closed");
        }
    }
}

struct Enriched {
    path: String,
    language: String,
    country_code: String,
    city: String,
    referrer: Referrer,
    utm: UtmParams,
    otm: OtmParams,
    session_template: Session,
}
