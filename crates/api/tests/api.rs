//! Router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use api::{create_router, AppConfig, AppState, SharedState};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use feature_codec::FEATURE_NAMES;
use inference_engine::{Classifier, FallbackParams, ForestParams, NearestCentroid};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceExt;

const ALICE_VECTOR: [i64; 20] = [5, 5, 0, 0, 0, 5, 5, 0, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 0];

struct TestApp {
    _dir: tempfile::TempDir,
    state: SharedState,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            fallback: FallbackParams {
                samples: 200,
                forest: ForestParams {
                    n_trees: 5,
                    max_depth: 6,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let state = Arc::new(RwLock::new(AppState::open(config).unwrap()));
        let router = create_router(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn register(&self, username: &str, password: &str) -> StatusCode {
        let body = json!({ "username": username, "password": password });
        self.json(post("/api/v1/auth/register", None, body)).await.0
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = json!({ "username": username, "password": password });
        let (status, value) = self.json(post("/api/v1/auth/login", None, body)).await;
        assert_eq!(status, StatusCode::OK, "{}", value);
        value["token"].as_str().unwrap().to_string()
    }

    /// Register, promote through the store and log in
    async fn admin(&self) -> String {
        assert_eq!(self.register("root", "toor").await, StatusCode::CREATED);
        self.state.read().await.auth.store().promote("root").unwrap();
        self.login("root", "toor").await
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn features(values: &[i64]) -> Value {
    let map: serde_json::Map<String, Value> = FEATURE_NAMES
        .iter()
        .zip(values)
        .map(|(name, v)| (name.to_string(), json!(v)))
        .collect();
    json!({ "features": map })
}

#[tokio::test]
async fn test_health_reports_fallback_model() {
    let app = TestApp::new();
    let (status, body) = app.json(get("/api/v1/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["model"]["source"]["source"], "synthetic_fallback");
    assert_eq!(body["components"]["model"]["n_features"], 20);
    assert_eq!(body["components"]["history"]["records"], 0);
}

#[tokio::test]
async fn test_features_listing() {
    let app = TestApp::new();
    let (status, body) = app.json(get("/api/v1/features", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 20);
    assert_eq!(body["data"][0]["name"], "anxiety_level");
    assert_eq!(body["data"][2]["kind"], "binary");
    assert_eq!(body["data"][2]["max"], 1);
}

#[tokio::test]
async fn test_alice_analysis_is_recorded() {
    let app = TestApp::new();
    assert_eq!(app.register("Alice", "pw123").await, StatusCode::CREATED);
    let token = app.login("Alice", "pw123").await;

    let (status, outcome) = app
        .json(post("/api/v1/analyze", Some(&token), features(&ALICE_VECTOR)))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["used_fallback"], true);
    let level = outcome["stress_level"].as_str().unwrap().to_string();
    assert!(["LOW", "MODERATE", "HIGH"].contains(&level.as_str()));

    let records = app.state.read().await.history.read_by_user("Alice").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stress_level.as_str(), level);
    let stored: Vec<i64> = records[0].features.values().iter().map(|&v| v as i64).collect();
    assert_eq!(stored, ALICE_VECTOR.to_vec());

    let (status, history) = app.json(get("/api/v1/history", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["count"], 1);
    assert_eq!(history["summary"]["total"], 1);
    assert_eq!(history["data"][0]["username"], "Alice");
}

#[tokio::test]
async fn test_analysis_requires_login() {
    let app = TestApp::new();
    let (status, _) = app
        .json(post("/api/v1/analyze", None, features(&ALICE_VECTOR)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.json(get("/api/v1/history", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_answers_are_rejected() {
    let app = TestApp::new();
    app.register("bob", "secret").await;
    let token = app.login("bob", "secret").await;

    let mut out_of_range = ALICE_VECTOR;
    out_of_range[0] = 11;
    out_of_range[2] = 3;
    let (status, body) = app
        .json(post("/api/v1/analyze", Some(&token), features(&out_of_range)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .json(post("/api/v1/analyze", Some(&token), features(&ALICE_VECTOR[..19])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.state.read().await.history.count().unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new();
    assert_eq!(app.register("Alice", "pw123").await, StatusCode::CREATED);
    assert_eq!(app.register("alice", "other").await, StatusCode::CONFLICT);
    assert_eq!(app.register("", "x").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    let body = json!({ "username": "Alice", "password": "nope" });
    let (status, _) = app.json(post("/api/v1/auth/login", None, body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    let token = app.login("Alice", "pw123").await;

    let (_, session) = app.json(get("/api/v1/session", Some(&token))).await;
    assert_eq!(session["state"], "logged_in");
    assert_eq!(session["role"], "user");

    let (status, _) = app.send(post("/api/v1/auth/logout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, session) = app.json(get("/api/v1/session", Some(&token))).await;
    assert_eq!(session["state"], "logged_out");
    let (status, _) = app.json(get("/api/v1/history", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    let user = app.login("Alice", "pw123").await;

    let (status, _) = app.json(get("/api/v1/admin/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.json(get("/api/v1/admin/users", Some(&user))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .json(post("/api/v1/admin/users/Alice/promote", Some(&user), json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin().await;
    let (status, users) = app.json(get("/api/v1/admin/users", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["count"], 2);
}

#[tokio::test]
async fn test_promotion_updates_open_sessions() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    let user = app.login("Alice", "pw123").await;
    let admin = app.admin().await;

    let (status, body) = app
        .json(post("/api/v1/admin/users/alice/promote", Some(&admin), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (_, session) = app.json(get("/api/v1/session", Some(&user))).await;
    assert_eq!(session["role"], "admin");

    let (status, _) = app
        .json(post("/api/v1/admin/users/nobody/promote", Some(&admin), json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exports() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    let user = app.login("Alice", "pw123").await;
    let admin = app.admin().await;
    app.json(post("/api/v1/analyze", Some(&user), features(&ALICE_VECTOR))).await;
    app.json(post("/api/v1/analyze", Some(&admin), features(&ALICE_VECTOR))).await;

    let (status, body) = app.send(get("/api/v1/history/export", Some(&user))).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(body).unwrap();
    assert!(csv.starts_with("username,timestamp,dt_iso,stress_level,anxiety_level"));
    assert_eq!(csv.lines().count(), 2);

    let (_, body) = app.send(get("/api/v1/history/export", Some(&admin))).await;
    assert_eq!(String::from_utf8(body).unwrap().lines().count(), 3);

    let (status, body) = app.send(get("/api/v1/admin/users/export", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(body).unwrap();
    assert!(csv.contains("Alice"));
    assert!(!csv.contains("sha256$"));
}

#[tokio::test]
async fn test_history_scope_all() {
    let app = TestApp::new();
    app.register("Alice", "pw123").await;
    app.register("Bob", "pw456").await;
    let alice = app.login("Alice", "pw123").await;
    let bob = app.login("Bob", "pw456").await;
    app.json(post("/api/v1/analyze", Some(&alice), features(&ALICE_VECTOR))).await;
    app.json(post("/api/v1/analyze", Some(&bob), features(&ALICE_VECTOR))).await;

    let (_, mine) = app.json(get("/api/v1/history?scope=mine", Some(&bob))).await;
    assert_eq!(mine["count"], 1);

    let (_, all) = app.json(get("/api/v1/history?scope=all&limit=1", Some(&bob))).await;
    assert_eq!(all["count"], 1);
    assert_eq!(all["data"][0]["username"], "Bob");
    assert_eq!(all["summary"]["total"], 2);
    assert_eq!(all["summary"]["unique_users"], 2);
}

#[tokio::test]
async fn test_model_upload_validation() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let request = Request::builder()
        .method("PUT")
        .uri("/api/v1/admin/model")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::from(&b"not a model"[..]))
        .unwrap();
    let (status, _) = app.json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let blob = {
        let state = app.state.read().await;
        inference_engine::encode_classifier(&state.engine.artifact().classifier).unwrap()
    };
    let request = Request::builder()
        .method("PUT")
        .uri("/api/v1/admin/model")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::from(blob))
        .unwrap();
    let (status, body) = app.json(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"]["source"], "loaded");
}

fn upload(token: &str, blob: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/api/v1/admin/model")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(blob))
        .unwrap()
}

#[tokio::test]
async fn test_model_upload_rejects_extra_class() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let four = Classifier::NearestCentroid(NearestCentroid::from_centroids(vec![vec![0.0; 20]; 4]));
    let blob = inference_engine::encode_classifier(&four).unwrap();
    let (status, body) = app.json(upload(&admin, blob)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("classes"));

    // Nothing was installed
    let (_, health) = app.json(get("/api/v1/health", None)).await;
    assert_eq!(health["components"]["model"]["source"]["source"], "synthetic_fallback");
}

#[tokio::test]
async fn test_model_upload_accepts_large_bodies() {
    let app = TestApp::new();
    let admin = app.admin().await;

    // Past axum's 2 MB default; refused as a bad artifact, not as too large
    let (status, _) = app.json(upload(&admin, vec![0u8; 3 * 1024 * 1024])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
