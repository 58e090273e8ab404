//! Integration tests for the link lifecycle over HTTP
//!
//! These drive the whole stack: routing, handlers, the allocator, the
//! code pool file, and the database, using a throwaway directory per
//! test.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use shortlinks::config::Config;
use shortlinks::database::AppState;
use shortlinks::route::create_app;

/// Builds a test application backed by a temp directory. The state is
/// returned as well so tests can seed or inspect storage directly.
fn setup_test_app() -> (axum::Router, AppState, TempDir) {
    setup_test_app_with(Config::default())
}

fn setup_test_app_with(template: Config) -> (axum::Router, AppState, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = Config {
        database_path: dir.path().join("links.db").to_string_lossy().into_owned(),
        codes_path: dir.path().join("codes.txt").to_string_lossy().into_owned(),
        ..template
    };
    let state = AppState::new(config).expect("failed to initialize test state");
    (create_app(state.clone()), state, dir)
}

/// Helper function to parse a response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("failed to parse JSON")
}

fn post_link(payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/links")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_link_with_requested_code() {
    let (app, _state, _dir) = setup_test_app();

    let payload = json!({
        "link": "https://example.com",
        "requested_code": "AAA"
    });

    let response = app.oneshot(post_link(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "AAA");
    assert_eq!(body["link"], "https://example.com");
    assert!(body["short_url"].as_str().unwrap().ends_with("/AAA"));
}

#[tokio::test]
async fn requested_code_collision_is_rejected() {
    let (app, _state, _dir) = setup_test_app();

    let payload = json!({
        "link": "https://example.com",
        "requested_code": "AAA"
    });

    let response = app.clone().oneshot(post_link(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same requested code a second time must be refused.
    let response = app.oneshot(post_link(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "code_taken");
}

#[tokio::test]
async fn requested_code_format_is_validated() {
    let (app, _state, _dir) = setup_test_app();

    for bad in ["a", "a b", "päth"] {
        let payload = json!({
            "link": "https://example.com",
            "requested_code": bad
        });
        let response = app.clone().oneshot(post_link(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT, "code {:?}", bad);

        let body = response_json(response.into_body()).await;
        assert_eq!(body["code"], "invalid_format");
    }
}

#[tokio::test]
async fn reserved_paths_cannot_be_taken() {
    let (app, _state, _dir) = setup_test_app();

    for reserved in ["login", "manage", "accounts", "api"] {
        let payload = json!({
            "link": "https://example.com",
            "requested_code": reserved
        });
        let response = app.clone().oneshot(post_link(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT, "path {:?}", reserved);
    }
}

#[tokio::test]
async fn generated_codes_come_from_the_pool() {
    let (app, _state, _dir) = setup_test_app();

    let payload = json!({"link": "https://example.com/generated"});
    let response = app.oneshot(post_link(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    let code = body["code"].as_str().unwrap();
    assert_eq!(code.len(), 3);
    assert!(code.bytes().all(|b| b.is_ascii_uppercase()));
}

#[tokio::test]
async fn missing_destination_is_a_bad_request() {
    let (app, _state, _dir) = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_link(&json!({"requested_code": "AAA"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(post_link(&json!({"link": "  "}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quota_and_expiry_inputs_are_validated() {
    let (app, _state, _dir) = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_link(&json!({
            "link": "https://example.com",
            "max_visits": 0
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_link(&json!({
            "link": "https://example.com",
            "expires_at": "2001-01-01T00:00:00Z"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn follow_redirects_and_counts_the_visit() {
    let (app, state, _dir) = setup_test_app();

    let payload = json!({
        "link": "https://example.com/target",
        "requested_code": "visitme"
    });
    app.clone().oneshot(post_link(&payload)).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/visitme")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://example.com/target"
    );

    let record = state.store.get("visitme").unwrap().unwrap();
    assert_eq!(record.visit_count, 1);
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let (app, _state, _dir) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/ZZZ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn visit_quota_evicts_the_link() {
    let (app, state, _dir) = setup_test_app();

    let payload = json!({
        "link": "https://example.com/once",
        "requested_code": "onceonly",
        "max_visits": 1
    });
    app.clone().oneshot(post_link(&payload)).await.unwrap();

    let get = || {
        Request::builder()
            .method("GET")
            .uri("/onceonly")
            .body(Body::empty())
            .unwrap()
    };

    // First visit redirects and uses up the quota.
    let response = app.clone().oneshot(get()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    // Second visit observes the exhausted quota: 410, record deleted.
    let response = app.clone().oneshot(get()).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    assert!(state.store.get("onceonly").unwrap().is_none());

    // Third visit cannot tell the code ever existed.
    let response = app.oneshot(get()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_link_is_gone_on_first_lookup() {
    let (app, state, _dir) = setup_test_app();

    // Seed a record whose expiry is already in the past; the HTTP API
    // refuses to create those, which is exactly why the store is used.
    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    state
        .store
        .reserve("stale1", "https://example.com/old", "", None, Some(past))
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/stale1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    assert!(state.store.get("stale1").unwrap().is_none());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/stale1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn require_login_blocks_anonymous_creation() {
    let (app, _state, _dir) = setup_test_app_with(Config {
        require_login: true,
        ..Config::default()
    });

    let payload = json!({"link": "https://example.com"});
    let response = app.oneshot(post_link(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn analytics_failures_never_break_the_redirect() {
    let (app, state, _dir) = setup_test_app_with(Config {
        analytics: shortlinks::config::AnalyticsConfig {
            enabled: true,
            ip: true,
            user_agent: true,
            referer: true,
            geo_country: false,
            geo_city: false,
        },
        ..Config::default()
    });

    let payload = json!({
        "link": "https://example.com/tracked",
        "requested_code": "tracked"
    });
    app.clone().oneshot(post_link(&payload)).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/tracked")
                .header("x-forwarded-for", "203.0.113.9")
                .header("user-agent", "integration-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The redirect stands regardless of what analytics did.
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(state.store.get("tracked").unwrap().unwrap().visit_count, 1);
}
