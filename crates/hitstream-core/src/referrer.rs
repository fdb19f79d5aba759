use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::RwLock;
use url::Url;

use crate::request::IngestRequest;

const ANDROID_APP_PREFIX: &str = "android-app://";
const PLAY_STORE_URL: &str = "https://play.google.com/store/apps/details?id=";

/// Query parameters consulted, in order, when the `Referer` header is absent.
const REFERRER_QUERY_PARAMS: [&str; 5] = ["ref", "referer", "referrer", "source", "utm_source"];

/// Well-known referrer-spam domains. Requests arriving with one of these are
/// not tracked at all (see [`ignore_referrer`]). Matched with the subdomain
/// stripped, so `semalt.semalt.com` hits the `semalt.com` entry.
const REFERRER_SPAM_DOMAINS: [&str; 30] = [
    "0n-line.tv",
    "100dollars-seo.com",
    "4webmasters.org",
    "7makemoneyonline.com",
    "anticrawler.org",
    "baixar-musicas-gratis.com",
    "best-seo-offer.com",
    "best-seo-solution.com",
    "bestwebsitesawards.com",
    "bottraffic.live",
    "buttons-for-website.com",
    "buttons-for-your-website.com",
    "buy-cheap-online.info",
    "darodar.com",
    "descargar-musica-gratis.net",
    "event-tracking.com",
    "fix-website-errors.com",
    "floating-share-buttons.com",
    "free-social-buttons.com",
    "get-free-traffic-now.com",
    "hulfingtonpost.com",
    "ilovevitaly.com",
    "monetization-of-website.com",
    "o-o-6-o-o.com",
    "ranksonic.info",
    "sanjosestartups.com",
    "semalt.com",
    "success-seo.com",
    "traffic2cash.org",
    "video--production.com",
];

/// A resolved referrer: normalised URL, display name, and icon URL.
/// Empty fields mean the respective part is unknown or was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Referrer {
    pub url: String,
    pub name: String,
    pub icon: String,
}

/// True if the request's referrer is on the global spam blacklist. Such
/// requests are not tracked at all.
pub fn ignore_referrer(req: &IngestRequest) -> bool {
    let referrer = referrer_from_header_or_query(req);

    if referrer.is_empty() {
        return false;
    }

    let host = match Url::parse(&referrer) {
        Ok(url) => url.host_str().unwrap_or("").to_string(),
        Err(_) => referrer,
    };

    spam_domains().contains(strip_subdomain(&host))
}

/// Resolve and normalise the referrer for a request.
///
/// `explicit` (from hit options) wins over the `Referer` header, which wins
/// over the fallback query parameters. `android-app://` referrers are looked
/// up in the Play Store via `apps`. Bare-IP hosts and blacklisted domains
/// resolve to all-empty.
pub async fn resolve_referrer(
    req: &IngestRequest,
    explicit: &str,
    domain_blacklist: &[String],
    ignore_subdomain: bool,
    apps: &AndroidAppResolver,
) -> Referrer {
    let referrer = if explicit.is_empty() {
        referrer_from_header_or_query(req)
    } else {
        explicit.to_string()
    };

    if referrer.is_empty() {
        return Referrer::default();
    }

    if referrer.to_lowercase().starts_with(ANDROID_APP_PREFIX) {
        let (name, icon) = apps.resolve(&referrer).await;
        return Referrer {
            url: referrer,
            name,
            icon,
        };
    }

    let url = match Url::parse(&referrer) {
        Ok(url) => url,
        Err(_) => {
            if is_ip(&referrer) {
                return Referrer::default();
            }

            // Free-form referrers (utm_source values for example) are kept
            // as a name unless blacklisted.
            if domain_blacklist.iter().any(|domain| domain == &referrer) {
                return Referrer::default();
            }

            return Referrer {
                url: String::new(),
                name: referrer.trim().to_string(),
                icon: String::new(),
            };
        }
    };

    let mut hostname = url.host_str().unwrap_or("").to_string();

    if is_ip(&hostname) {
        return Referrer::default();
    }

    if ignore_subdomain {
        hostname = strip_subdomain(&hostname).to_string();
    }

    if domain_blacklist.iter().any(|domain| domain == &hostname) {
        return Referrer::default();
    }

    Referrer {
        url: normalize_url(url),
        name: hostname,
        icon: String::new(),
    }
}

/// Strip query and fragment; drop a bare `/` path.
fn normalize_url(mut url: Url) -> String {
    url.set_query(None);
    url.set_fragment(None);
    let mut out = url.to_string();

    if url.path() == "/" && out.ends_with('/') {
        out.pop();
    }

    out
}

fn referrer_from_header_or_query(req: &IngestRequest) -> String {
    if !req.referer.is_empty() {
        return req.referer.clone();
    }

    for param in REFERRER_QUERY_PARAMS {
        let referrer = req.query_param(param);

        if !referrer.is_empty() {
            return referrer.to_string();
        }
    }

    String::new()
}

fn is_ip(referrer: &str) -> bool {
    let referrer = referrer.trim_matches('/');

    if referrer.parse::<IpAddr>().is_ok() {
        return true;
    }

    // host:port
    if let Some((host, port)) = referrer.rsplit_once(':') {
        return port.parse::<u16>().is_ok() && host.parse::<IpAddr>().is_ok();
    }

    false
}

/// Reduce a hostname to its last two dot-separated labels.
/// `www.example.com` becomes `example.com`; `example.com` stays unchanged.
pub fn strip_subdomain(hostname: &str) -> &str {
    let mut dots = 0;

    for (index, byte) in hostname.bytes().enumerate().rev() {
        if byte == b'.' {
            dots += 1;

            if dots == 2 {
                return &hostname[index + 1..];
            }
        }
    }

    hostname
}

fn spam_domains() -> &'static std::collections::HashSet<&'static str> {
    static DOMAINS: OnceLock<std::collections::HashSet<&'static str>> = OnceLock::new();
    DOMAINS.get_or_init(|| REFERRER_SPAM_DOMAINS.iter().copied().collect())
}

/// Resolves `android-app://<package>` referrers to an app name and icon by
/// fetching the Play Store page. Results (including misses) are cached per
/// package name so the outbound request happens at most once per package.
pub struct AndroidAppResolver {
    client: Option<reqwest::Client>,
    cache: RwLock<HashMap<String, (String, String)>>,
}

impl Default for AndroidAppResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AndroidAppResolver {
    pub fn new() -> Self {
        AndroidAppResolver {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .ok(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// App (name, icon) for an `android-app://` referrer. Empty strings on
    /// any network or parse failure.
    pub async fn resolve(&self, referrer: &str) -> (String, String) {
        let package = &referrer[ANDROID_APP_PREFIX.len()..];

        if let Some(cached) = self.cache.read().await.get(package) {
            return cached.clone();
        }

        let resolved = self.fetch(package).await;
        self.cache
            .write()
            .await
            .insert(package.to_string(), resolved.clone());
        resolved
    }

    async fn fetch(&self, package: &str) -> (String, String) {
        let client = match &self.client {
            Some(client) => client,
            None => return (String::new(), String::new()),
        };

        let response = match client
            .get(format!("{PLAY_STORE_URL}{package}"))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return (String::new(), String::new()),
        };

        match response.text().await {
            Ok(body) => parse_app_page(&body),
            Err(_) => (String::new(), String::new()),
        }
    }
}

/// Extract the app name (first `<h1>`) and icon (`<img itemprop="image">`)
/// from a Play Store details page.
fn parse_app_page(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let name = Selector::parse("h1")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|node| node.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    if name.is_empty() {
        return (String::new(), String::new());
    }

    let icon = Selector::parse(r#"img[itemprop="image"]"#)
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|node| node.value().attr("src"))
                .map(str::to_string)
        })
        .unwrap_or_default();

    (name, icon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AndroidAppResolver {
        AndroidAppResolver::new()
    }

    fn request_with_referer(referer: &str) -> IngestRequest {
        let mut req = IngestRequest::get("/");
        req.referer = referer.to_string();
        req
    }

    #[tokio::test]
    async fn strips_query_and_fragment() {
        let req = request_with_referer("https://example.com/path/to/page?q=1&utm_x=2#section");
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer.url, "https://example.com/path/to/page");
        assert_eq!(referrer.name, "example.com");
        assert_eq!(referrer.icon, "");
    }

    #[tokio::test]
    async fn drops_bare_slash_path() {
        let req = request_with_referer("https://example.com/");
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer.url, "https://example.com");
    }

    #[tokio::test]
    async fn explicit_referrer_wins_over_header() {
        let req = request_with_referer("https://header.example.com/");
        let referrer =
            resolve_referrer(&req, "https://explicit.example.com/", &[], false, &resolver()).await;
        assert_eq!(referrer.name, "explicit.example.com");
    }

    #[tokio::test]
    async fn falls_back_to_query_parameters_in_order() {
        let mut req = IngestRequest::get("/");
        req.query = vec![
            ("utm_source".to_string(), "Newsletter".to_string()),
            ("ref".to_string(), "https://example.com/".to_string()),
        ];
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer.name, "example.com");
    }

    #[tokio::test]
    async fn keeps_free_form_referrer_as_name() {
        let mut req = IngestRequest::get("/");
        req.query = vec![("utm_source".to_string(), "Newsletter".to_string())];
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer.url, "");
        assert_eq!(referrer.name, "Newsletter");
    }

    #[tokio::test]
    async fn drops_ip_hosts() {
        let req = request_with_referer("http://192.168.1.4/page");
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer, Referrer::default());

        let req = request_with_referer("81.2.69.142");
        let referrer = resolve_referrer(&req, "", &[], false, &resolver()).await;
        assert_eq!(referrer, Referrer::default());
    }

    #[tokio::test]
    async fn blacklist_drops_exact_host() {
        let blacklist = vec!["example.com".to_string()];
        let req = request_with_referer("https://example.com/");
        let referrer = resolve_referrer(&req, "", &blacklist, false, &resolver()).await;
        assert_eq!(referrer, Referrer::default());

        // Subdomain passes without the strip flag.
        let req = request_with_referer("https://www.example.com/");
        let referrer = resolve_referrer(&req, "", &blacklist, false, &resolver()).await;
        assert_eq!(referrer.name, "www.example.com");
    }

    #[tokio::test]
    async fn blacklist_catches_subdomains_when_stripping() {
        let blacklist = vec!["example.com".to_string()];
        let req = request_with_referer("https://www.example.com/");
        let referrer = resolve_referrer(&req, "", &blacklist, true, &resolver()).await;
        assert_eq!(referrer, Referrer::default());
    }

    #[tokio::test]
    async fn blacklist_drops_free_form_referrer() {
        let blacklist = vec!["example.com".to_string()];
        let referrer = resolve_referrer(
            &IngestRequest::get("/"),
            "example.com",
            &blacklist,
            false,
            &resolver(),
        )
        .await;
        assert_eq!(referrer, Referrer::default());
    }

    #[test]
    fn strip_subdomain_keeps_last_two_labels() {
        assert_eq!(strip_subdomain("www.example.com"), "example.com");
        assert_eq!(strip_subdomain("a.b.example.com"), "example.com");
        assert_eq!(strip_subdomain("example.com"), "example.com");
        assert_eq!(strip_subdomain("localhost"), "localhost");
        assert_eq!(strip_subdomain(""), "");
    }

    #[test]
    fn ignores_global_spam_referrers() {
        let req = request_with_referer("https://www.semalt.com/campaign");
        assert!(ignore_referrer(&req));

        let req = request_with_referer("https://example.com/");
        assert!(!ignore_referrer(&req));

        let req = request_with_referer("");
        assert!(!ignore_referrer(&req));
    }

    #[test]
    fn parses_play_store_page() {
        let html = r#"<html><body>
            <h1><span>Example App</span></h1>
            <img itemprop="image" src="https://play.example/icon.png" alt="icon">
        </body></html>"#;
        let (name, icon) = parse_app_page(html);
        assert_eq!(name, "Example App");
        assert_eq!(icon, "https://play.example/icon.png");

        let (name, icon) = parse_app_page("<html><body><p>captcha</p></body></html>");
        assert_eq!(name, "");
        assert_eq!(icon, "");
    }
}
