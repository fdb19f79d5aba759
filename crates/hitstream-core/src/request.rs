/// An incoming tracking request, decoupled from any HTTP framework.
///
/// The server layer maps its framework types (axum extractors, socket
/// metadata, trusted-proxy resolution) into this struct; the tracker and the
/// enrichment functions only ever see this.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// HTTP method, uppercase. Anything but `GET` is ignored by the tracker.
    pub method: String,
    pub path: String,
    /// Decoded query parameters in request order.
    pub query: Vec<(String, String)>,
    /// Client IP after the deployment's proxy trust policy has been applied.
    pub remote_ip: String,
    pub user_agent: String,
    /// The `Referer` header, verbatim.
    pub referer: String,
    /// The `Accept-Language` header, verbatim.
    pub accept_language: String,
    /// The `DNT` header, verbatim. `"1"` means the request is not tracked.
    pub dnt: String,
}

impl IngestRequest {
    /// A GET request for `path` with no headers set. Handy in tests and for
    /// callers that fill in the rest field by field.
    pub fn get(path: impl Into<String>) -> Self {
        IngestRequest {
            method: "GET".to_string(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// First value for the query parameter `name`, or `""`.
    pub fn query_param(&self, name: &str) -> &str {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Normalised language from the `Accept-Language` header: the primary
    /// subtag of the first listed language, lowercased, capped at 10 chars.
    /// `"de-DE,de;q=0.9,en;q=0.8"` becomes `"de"`.
    pub fn language(&self) -> String {
        let first = self
            .accept_language
            .split(';')
            .next()
            .unwrap_or("")
            .split(',')
            .next()
            .unwrap_or("")
            .split('-')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if first.len() > 10 {
            String::new()
        } else {
            first
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_returns_first_match() {
        let mut req = IngestRequest::get("/");
        req.query = vec![
            ("ref".to_string(), "first".to_string()),
            ("ref".to_string(), "second".to_string()),
        ];
        assert_eq!(req.query_param("ref"), "first");
        assert_eq!(req.query_param("missing"), "");
    }

    #[test]
    fn language_takes_primary_subtag() {
        let mut req = IngestRequest::get("/");
        req.accept_language = "de-DE,de;q=0.9,en;q=0.8".to_string();
        assert_eq!(req.language(), "de");

        req.accept_language = "EN-us".to_string();
        assert_eq!(req.language(), "en");

        req.accept_language = String::new();
        assert_eq!(req.language(), "");
    }

    #[test]
    fn language_rejects_oversized_values() {
        let mut req = IngestRequest::get("/");
        req.accept_language = "notalanguagetagatall".to_string();
        assert_eq!(req.language(), "");
    }
}
