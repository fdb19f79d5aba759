use hitstream_core::request::IngestRequest;
use url::Url;

/// Per-request overrides for `Tracker::hit` and `Tracker::event`.
///
/// Everything is optional; empty or zero fields fall back to the request
/// itself or the tracker configuration.
#[derive(Debug, Clone, Default)]
pub struct HitOptions {
    /// Tenant the hit belongs to. 0 for single-site deployments.
    pub client_id: u64,

    /// Overrides the page URL, e.g. when the ingest script reports the
    /// tracked page through a query parameter instead of the request path.
    pub url: String,

    /// Page title.
    pub title: String,

    /// Overrides referrer detection from headers and query parameters.
    pub referrer: String,

    pub screen_width: u16,
    pub screen_height: u16,

    /// Per-request referrer blacklist. Empty means "use the tracker config".
    pub referrer_domain_blacklist: Vec<String>,
    pub referrer_domain_blacklist_includes_subdomains: bool,
}

impl HitOptions {
    /// Read the overrides the ingest script passes as query parameters:
    /// `client_id`, `url`, `title`, `ref`, `w`, `h`.
    pub fn from_request(req: &IngestRequest) -> Self {
        HitOptions {
            client_id: req.query_param("client_id").parse().unwrap_or(0),
            url: req.query_param("url").to_string(),
            title: req.query_param("title").trim().to_string(),
            referrer: req.query_param("ref").to_string(),
            screen_width: req.query_param("w").parse().unwrap_or(0),
            screen_height: req.query_param("h").parse().unwrap_or(0),
            ..Default::default()
        }
    }

    /// The tracked path: the `url` override's path when set and parseable,
    /// else the request path.
    pub(crate) fn path(&self, req: &IngestRequest) -> String {
        if !self.url.is_empty() {
            if let Ok(url) = Url::parse(&self.url) {
                return url.path().to_string();
            }
        }

        req.path.clone()
    }
}

/// Options for `Tracker::event`.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Event name. Trimmed; events with an empty name are dropped.
    pub name: String,

    /// Optional duration in seconds, used for averages in reports.
    pub duration: u32,

    /// Arbitrary metadata. Values are stringified at ingest time.
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl EventOptions {
    /// Split the metadata into parallel key and value arrays, preserving the
    /// map's iteration order. Non-string values are JSON-encoded.
    pub(crate) fn meta_data(&self) -> (Vec<String>, Vec<String>) {
        let mut keys = Vec::with_capacity(self.meta.len());
        let mut values = Vec::with_capacity(self.meta.len());

        for (key, value) in &self.meta {
            keys.push(key.clone());
            values.push(match value {
                serde_json::Value::String(value) => value.clone(),
                other => other.to_string(),
            });
        }

        (keys, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_request_reads_overrides() {
        let mut req = IngestRequest::get("/collect");
        req.query = vec![
            ("client_id".to_string(), "42".to_string()),
            ("url".to_string(), "https://example.com/page".to_string()),
            ("title".to_string(), " My Page ".to_string()),
            ("ref".to_string(), "https://referrer.example/".to_string()),
            ("w".to_string(), "1920".to_string()),
            ("h".to_string(), "1080".to_string()),
        ];
        let options = HitOptions::from_request(&req);
        assert_eq!(options.client_id, 42);
        assert_eq!(options.url, "https://example.com/page");
        assert_eq!(options.title, "My Page");
        assert_eq!(options.referrer, "https://referrer.example/");
        assert_eq!(options.screen_width, 1920);
        assert_eq!(options.screen_height, 1080);
    }

    #[test]
    fn invalid_numeric_params_fall_back_to_zero() {
        let mut req = IngestRequest::get("/collect");
        req.query = vec![
            ("client_id".to_string(), "abc".to_string()),
            ("w".to_string(), "-3".to_string()),
        ];
        let options = HitOptions::from_request(&req);
        assert_eq!(options.client_id, 0);
        assert_eq!(options.screen_width, 0);
    }

    #[test]
    fn meta_data_splits_into_parallel_arrays() {
        let mut meta = serde_json::Map::new();
        meta.insert("hello".to_string(), json!("world"));
        meta.insert("meta".to_string(), json!("data"));
        meta.insert("count".to_string(), json!(3));
        let options = EventOptions {
            name: "event".to_string(),
            duration: 0,
            meta,
        };
        let (keys, values) = options.meta_data();
        assert_eq!(keys.len(), 3);
        assert_eq!(values.len(), 3);
        assert!(keys.contains(&"hello".to_string()));
        assert!(keys.contains(&"meta".to_string()));
        assert!(values.contains(&"world".to_string()));
        assert!(values.contains(&"data".to_string()));
        assert!(values.contains(&"3".to_string()));

        let position = keys.iter().position(|key| key == "hello").unwrap();
        assert_eq!(values[position], "world");
    }
}
