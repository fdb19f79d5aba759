use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use hitstream_core::request::IngestRequest;
use hitstream_tracker::{EventOptions, HitOptions};

use crate::state::AppState;

/// Event names the ingest script sends for plain page views.
const PAGE_VIEW_EVENTS: [&str; 2] = ["pageload", "pageclose"];

#[derive(Debug)]
pub struct MaybeConnectInfo(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeConnectInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

/// `GET /collect` — the single ingest endpoint.
///
/// `event_name` decides the record kind: absent or one of
/// `pageload`/`pageclose` tracks a page view, anything else tracks a custom
/// event with `event_data` parsed as a JSON object of metadata.
///
/// Always answers `202 Accepted` — guard rejections and backpressure drops
/// are invisible to the caller by design.
#[tracing::instrument(skip(state, headers))]
pub async fn collect(
    State(state): State<Arc<AppState>>,
    maybe_connect_info: MaybeConnectInfo,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let query: Vec<(String, String)> = raw_query
        .as_deref()
        .map(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let req = IngestRequest {
        method: "GET".to_string(),
        path: "/collect".to_string(),
        query,
        remote_ip: client_ip(&headers, maybe_connect_info.0, &state.trusted_proxies),
        user_agent: header(&headers, axum::http::header::USER_AGENT),
        referer: header(&headers, axum::http::header::REFERER),
        accept_language: header(&headers, axum::http::header::ACCEPT_LANGUAGE),
        dnt: headers
            .get("dnt")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string(),
    };

    let options = HitOptions::from_request(&req);
    let event_name = req.query_param("event_name").trim().to_string();

    if event_name.is_empty() || PAGE_VIEW_EVENTS.contains(&event_name.as_str()) {
        state.tracker.hit(&req, Some(options)).await;
    } else {
        let meta = serde_json::from_str(req.query_param("event_data")).unwrap_or_default();
        let duration = req.query_param("event_duration").parse().unwrap_or(0);
        state
            .tracker
            .event(
                &req,
                EventOptions {
                    name: event_name,
                    duration,
                    meta,
                },
                Some(options),
            )
            .await;
    }

    (StatusCode::ACCEPTED, Json(json!({ "ok": true })))
}

fn header(headers: &HeaderMap, name: axum::http::header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Resolve the client IP.
///
/// The socket address wins unless it belongs to a trusted proxy, in which
/// case the first `X-Forwarded-For` entry is used. Without socket metadata
/// (tests, exotic deployments) the header is the only source.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxies: &[ipnet::IpNet],
) -> String {
    let forwarded = forwarded_ip(headers);

    if let Some(addr) = remote_addr {
        let remote_ip = addr.ip();

        if trusted_proxies.iter().any(|cidr| cidr.contains(&remote_ip)) {
            return forwarded.unwrap_or(remote_ip).to_string();
        }

        return remote_ip.to_string();
    }

    forwarded
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
}
