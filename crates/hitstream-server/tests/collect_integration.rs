use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use hitstream_core::fingerprint::set_fingerprint_keys;
use hitstream_core::store::MemStore;
use hitstream_server::app::build_app;
use hitstream_server::state::AppState;
use hitstream_tracker::{Tracker, TrackerConfig};

const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:89.0) Gecko/20100101 Firefox/89.0";

/// Fresh in-memory store + tracker + app for each test.
async fn setup() -> (Arc<MemStore>, Arc<AppState>, axum::Router) {
    set_fingerprint_keys(42, 123);
    let store = Arc::new(MemStore::new());
    let tracker = Tracker::new(store.clone(), "salt", Some(TrackerConfig::default()))
        .await
        .expect("tracker");
    let state = Arc::new(AppState::new(tracker, Vec::new()));
    let app = build_app(Arc::clone(&state));
    (store, state, app)
}

fn collect_request(query: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/collect?{query}"))
        .header("user-agent", user_agent)
        .header("x-forwarded-for", "81.2.69.142")
        .body(Body::empty())
        .expect("build request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn collect_tracks_a_page_view() {
    let (store, state, app) = setup().await;

    let response = app
        .oneshot(collect_request(
            "event_name=pageload&url=https%3A%2F%2Fexample.com%2Fpricing&title=Pricing&w=1920&h=1080",
            FIREFOX,
        ))
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await, json!({ "ok": true }));

    state.tracker.stop().await;

    let page_views = store.page_views().await;
    assert_eq!(page_views.len(), 1);
    assert_eq!(page_views[0].path, "/pricing");
    assert_eq!(page_views[0].title, "Pricing");
    assert_eq!(page_views[0].screen_class, "Full HD");
    assert_eq!(store.sessions().await.len(), 1);
    assert_eq!(store.events().await.len(), 0);
}

#[tokio::test]
async fn collect_without_event_name_is_a_page_view() {
    let (store, state, app) = setup().await;

    let response = app
        .oneshot(collect_request("url=https%3A%2F%2Fexample.com%2F", FIREFOX))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    state.tracker.stop().await;
    assert_eq!(store.page_views().await.len(), 1);
}

#[tokio::test]
async fn collect_tracks_a_custom_event() {
    let (store, state, app) = setup().await;

    let event_data = serde_json::to_string(&json!({"hello": "world", "plan": "pro"}))
        .expect("encode meta");
    let query = format!(
        "event_name=signup&event_duration=42&event_data={}",
        url::form_urlencoded::byte_serialize(event_data.as_bytes()).collect::<String>()
    );

    let response = app
        .oneshot(collect_request(&query, FIREFOX))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    state.tracker.stop().await;

    let events = store.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "signup");
    assert_eq!(events[0].duration_seconds, 42);
    assert!(events[0].meta_keys.contains(&"hello".to_string()));
    assert!(events[0].meta_values.contains(&"world".to_string()));

    // Events extend the session but only the event record is persisted.
    assert_eq!(store.page_views().await.len(), 0);
    assert_eq!(store.sessions().await.len(), 0);
}

#[tokio::test]
async fn collect_drops_bot_traffic_silently() {
    let (store, state, app) = setup().await;

    let response = app
        .oneshot(collect_request("event_name=pageload", "Googlebot/2.1"))
        .await
        .expect("request");

    // Bots still get a 202; nothing is written.
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    state.tracker.stop().await;
    assert_eq!(store.page_views().await.len(), 0);
    assert_eq!(store.sessions().await.len(), 0);
    assert_eq!(store.user_agents().await.len(), 0);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (_store, _state, app) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}
