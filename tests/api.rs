//! HTTP API driven end to end against the in-memory store.
//!
//! These tests verify:
//! 1. Account, key and worker management with the standard error envelope
//! 2. Strict vs flexible endpoint eligibility
//! 3. The worker field gate on task updates and comments
//! 4. Broadcasts fire only for committed mutations
//! 5. The per-IP throttle on auth endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use forge::config::Config;
use forge::realtime::{Scope, Subscriber};
use forge::store::memory::MemoryStore;
use forge::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::for_tests())
    }

    fn with_config(config: Config) -> Self {
        let state = AppState::new(config, Arc::new(MemoryStore::new())).unwrap();
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    async fn call(&self, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.router, method, uri, key, body).await
    }

    /// Registers a user and returns its OWNER key.
    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/forge/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["api_key"].as_str().unwrap().to_string()
    }

    async fn create_project(&self, key: &str, name: &str) -> Uuid {
        let (status, body) = self
            .call("POST", "/api/forge/projects", Some(key), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        id(&body)
    }

    /// Creates a worker and returns `(worker_id, worker_key)`.
    async fn create_worker(&self, key: &str, name: &str) -> (Uuid, String) {
        let (status, body) = self
            .call("POST", "/api/forge/workers", Some(key), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let worker_id = id(&body);

        let (status, body) = self
            .call(
                "POST",
                &format!("/api/forge/workers/{}/keys", worker_id),
                Some(key),
                Some(json!({ "name": "runner" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["role"], "WORKER");
        (worker_id, body["api_key"].as_str().unwrap().to_string())
    }

    async fn create_task(&self, key: &str, project_id: Uuid, assignee: Option<Uuid>) -> Value {
        let (status, body) = self
            .call(
                "POST",
                "/api/forge/tasks",
                Some(key),
                Some(json!({
                    "project_id": project_id,
                    "title": "Index the archive",
                    "assigned_worker_id": assignee,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

async fn send(router: &Router, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        req = req.header("x-api-key", key);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn id(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

fn assert_error(body: &Value, kind: &str, status: StatusCode) {
    assert_eq!(body["error"]["type"], kind, "{body}");
    assert_eq!(body["error"]["status"], status.as_u16(), "{body}");
}

mod accounts {
    use super::*;

    /// Registration returns the user and a working OWNER key.
    #[tokio::test]
    async fn test_register_then_me() {
        let app = TestApp::new();
        let key = app.register("ada").await;

        let (status, me) = app.call("GET", "/api/forge/me", Some(&key), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["kind"], "user");
        assert_eq!(me["username"], "ada");
        assert!(me.get("password_hash").is_none());
    }

    /// Duplicate usernames and emails are rejected with 409.
    #[tokio::test]
    async fn test_duplicate_registration() {
        let app = TestApp::new();
        app.register("ada").await;

        let (status, body) = app
            .call(
                "POST",
                "/api/forge/auth/register",
                None,
                Some(json!({"username": "ada", "email": "other@example.com", "password": "long enough"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_error(&body, "ALREADY_EXISTS", StatusCode::CONFLICT);

        let (status, _) = app
            .call(
                "POST",
                "/api/forge/auth/register",
                None,
                Some(json!({"username": "bob", "email": "ADA@example.com", "password": "long enough"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    /// Login mints an expiring SESSION key; bad passwords are a 400.
    #[tokio::test]
    async fn test_login_and_logout() {
        let app = TestApp::new();
        app.register("ada").await;

        let (status, body) = app
            .call(
                "POST",
                "/api/forge/auth/login",
                None,
                Some(json!({"username": "ada", "password": "wrong password"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error(&body, "INVALID_PAYLOAD", StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(
                "POST",
                "/api/forge/auth/login",
                None,
                Some(json!({"username": "ada", "password": "correct horse battery"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"]["role"], "SESSION");
        assert!(body["key"]["expires_at"].is_string());
        let session = body["api_key"].as_str().unwrap().to_string();

        let (status, _) = app.call("POST", "/api/forge/auth/logout", Some(&session), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.call("GET", "/api/forge/me", Some(&session), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_error(&body, "UNAUTHORIZED", StatusCode::FORBIDDEN);
    }

    /// No header and garbage headers share the UNAUTHORIZED envelope.
    #[tokio::test]
    async fn test_missing_and_unknown_keys() {
        let app = TestApp::new();
        let (status, body) = app.call("GET", "/api/forge/me", None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_error(&body, "UNAUTHORIZED", StatusCode::FORBIDDEN);

        let (status, _) = app.call("GET", "/api/forge/me", Some("fgk_nope"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let metrics = app.state.metrics.encode();
        assert!(metrics.contains("forge_auth_failures_total{reason=\"missing\"} 1"));
        assert!(metrics.contains("forge_auth_failures_total{reason=\"unknown\"} 1"));
    }

    /// A valid key sent in the agent-secret header is not a Forge credential.
    #[tokio::test]
    async fn test_agent_secret_header_is_not_accepted() {
        let app = TestApp::new();
        let key = app.register("ada").await;

        let req = Request::builder()
            .uri("/api/forge/me")
            .header("x-agent-secret", key.as_str())
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_error(&body, "UNAUTHORIZED", StatusCode::FORBIDDEN);
    }

    /// Extra OWNER keys can be listed and revoked by their user only.
    #[tokio::test]
    async fn test_key_management() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        let bob = app.register("bob").await;

        let (status, issued) = app
            .call("POST", "/api/forge/keys", Some(&ada), Some(json!({"name": "ci", "ttl_secs": 3600})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let key_id = id(&issued);

        let (_, keys) = app.call("GET", "/api/forge/keys", Some(&ada), None).await;
        assert_eq!(keys.as_array().unwrap().len(), 2);
        assert!(keys[0].get("api_key").is_none());

        let (status, _) = app
            .call("DELETE", &format!("/api/forge/keys/{}", key_id), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call("DELETE", &format!("/api/forge/keys/{}", key_id), Some(&ada), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    /// Unknown routes and malformed bodies use the envelope too.
    #[tokio::test]
    async fn test_fallback_and_bad_json() {
        let app = TestApp::new();
        let (status, body) = app.call("GET", "/api/forge/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_error(&body, "NOT_FOUND", StatusCode::NOT_FOUND);

        let (status, body) = app
            .call("POST", "/api/forge/auth/register", None, Some(json!({"username": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error(&body, "INVALID_PAYLOAD", StatusCode::BAD_REQUEST);
    }
}

mod workers {
    use super::*;

    /// Worker keys resolve flexibly but are refused by strict endpoints.
    #[tokio::test]
    async fn test_worker_key_eligibility() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let (worker_id, worker_key) = app.create_worker(&owner, "indexer").await;

        let (status, me) = app.call("GET", "/api/forge/me", Some(&worker_key), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["kind"], "worker");
        assert_eq!(me["id"], worker_id.to_string());

        let (status, body) = app
            .call("POST", "/api/forge/projects", Some(&worker_key), Some(json!({"name": "p"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_error(&body, "FORBIDDEN", StatusCode::FORBIDDEN);

        let (status, _) = app.call("GET", "/api/forge/keys", Some(&worker_key), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    /// Deleting a worker tombstones it and its keys stop working at once.
    #[tokio::test]
    async fn test_delete_worker_disables_keys() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let (worker_id, worker_key) = app.create_worker(&owner, "indexer").await;

        let (status, _) = app
            .call("DELETE", &format!("/api/forge/workers/{}", worker_id), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.call("GET", "/api/forge/me", Some(&worker_key), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_error(&body, "FORBIDDEN", StatusCode::FORBIDDEN);

        let (_, workers) = app.call("GET", "/api/forge/workers", Some(&owner), None).await;
        assert!(workers.as_array().unwrap().is_empty());

        // a second delete finds nothing live
        let (status, _) = app
            .call("DELETE", &format!("/api/forge/workers/{}", worker_id), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Another user cannot mint or revoke keys for someone else's worker.
    #[tokio::test]
    async fn test_worker_keys_are_owner_scoped() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        let bob = app.register("bob").await;
        let (worker_id, _) = app.create_worker(&ada, "indexer").await;

        let (status, _) = app
            .call(
                "POST",
                &format!("/api/forge/workers/{}/keys", worker_id),
                Some(&bob),
                Some(json!({"name": "stolen"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, keys) = app
            .call("GET", &format!("/api/forge/workers/{}/keys", worker_id), Some(&ada), None)
            .await;
        let key_id = id(&keys[0]);

        let (status, _) = app
            .call(
                "DELETE",
                &format!("/api/forge/workers/{}/keys/{}", worker_id, key_id),
                Some(&bob),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                "DELETE",
                &format!("/api/forge/workers/{}/keys/{}", worker_id, key_id),
                Some(&ada),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

mod tasks {
    use super::*;

    /// Assigned worker may set status and notes; nothing else, nowhere else.
    #[tokio::test]
    async fn test_worker_field_gate() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let (worker_id, worker_key) = app.create_worker(&owner, "indexer").await;
        let project = app.create_project(&owner, "archive").await;
        let mine = app.create_task(&owner, project, Some(worker_id)).await;
        let other = app.create_task(&owner, project, None).await;

        let uri = format!("/api/forge/tasks/{}", mine["id"].as_str().unwrap());
        let (status, task) = app
            .call("PATCH", &uri, Some(&worker_key), Some(json!({"status": "in_progress", "notes": "halfway"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "in_progress");
        assert_eq!(task["notes"], "halfway");
        assert_eq!(task["title"], mine["title"]);

        let (status, body) = app
            .call("PATCH", &uri, Some(&worker_key), Some(json!({"title": "renamed"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_error(&body, "FORBIDDEN", StatusCode::FORBIDDEN);

        let (status, _) = app
            .call("PATCH", &uri, Some(&worker_key), Some(json!({"status": "done", "assigned_worker_id": null})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let other_uri = format!("/api/forge/tasks/{}", other["id"].as_str().unwrap());
        let (status, _) = app
            .call("PATCH", &other_uri, Some(&worker_key), Some(json!({"status": "done"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // rejected updates changed nothing
        let (_, task) = app.call("GET", &uri, Some(&owner), None).await;
        assert_eq!(task["title"], mine["title"]);
        assert_eq!(task["status"], "in_progress");
    }

    /// Owners may change anything, including reassignment.
    #[tokio::test]
    async fn test_owner_updates_and_assignment_rules() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        let bob = app.register("bob").await;
        let (ada_worker, _) = app.create_worker(&ada, "indexer").await;
        let (bob_worker, _) = app.create_worker(&bob, "thief").await;
        let project = app.create_project(&ada, "archive").await;
        let task = app.create_task(&ada, project, None).await;
        let uri = format!("/api/forge/tasks/{}", task["id"].as_str().unwrap());

        let (status, updated) = app
            .call(
                "PATCH",
                &uri,
                Some(&ada),
                Some(json!({"title": "Reindex", "detail": "all shards", "assigned_worker_id": ada_worker})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Reindex");
        assert_eq!(updated["assigned_worker_id"], ada_worker.to_string());

        let (status, body) = app
            .call("PATCH", &uri, Some(&ada), Some(json!({"assigned_worker_id": bob_worker})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error(&body, "INVALID_PAYLOAD", StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call("PATCH", &uri, Some(&ada), Some(json!({"status": "finished"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    /// Tasks of another user are indistinguishable from missing ones.
    #[tokio::test]
    async fn test_cross_user_isolation() {
        let app = TestApp::new();
        let ada = app.register("ada").await;
        let bob = app.register("bob").await;
        let project = app.create_project(&ada, "archive").await;
        let task = app.create_task(&ada, project, None).await;
        let uri = format!("/api/forge/tasks/{}", task["id"].as_str().unwrap());

        let (status, body) = app.call("GET", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_error(&body, "NOT_FOUND", StatusCode::NOT_FOUND);

        let (status, _) = app.call("DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call("GET", &format!("/api/forge/projects/{}/tasks", project), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                "POST",
                "/api/forge/tasks",
                Some(&bob),
                Some(json!({"project_id": project, "title": "sneaky"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Soft delete hides the task until it is restored.
    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let project = app.create_project(&owner, "archive").await;
        let task = app.create_task(&owner, project, None).await;
        let uri = format!("/api/forge/tasks/{}", task["id"].as_str().unwrap());

        let (status, deleted) = app.call("DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(deleted["deleted_at"].is_string());

        let (status, _) = app.call("GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = app
            .call("GET", &format!("/api/forge/projects/{}/tasks", project), Some(&owner), None)
            .await;
        assert!(list.as_array().unwrap().is_empty());

        let (status, restored) = app
            .call("POST", &format!("{}/restore", uri), Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(restored["deleted_at"].is_null());

        let (status, _) = app.call("GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Duplicate project names per owner are refused.
    #[tokio::test]
    async fn test_duplicate_project_name() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        app.create_project(&owner, "archive").await;
        let (status, body) = app
            .call("POST", "/api/forge/projects", Some(&owner), Some(json!({"name": "archive"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_error(&body, "ALREADY_EXISTS", StatusCode::CONFLICT);
    }

    /// Workers comment only on tasks assigned to them.
    #[tokio::test]
    async fn test_comments_author_types() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let (worker_id, worker_key) = app.create_worker(&owner, "indexer").await;
        let project = app.create_project(&owner, "archive").await;
        let mine = app.create_task(&owner, project, Some(worker_id)).await;
        let other = app.create_task(&owner, project, None).await;

        let uri = format!("/api/forge/tasks/{}/comments", mine["id"].as_str().unwrap());
        let (status, comment) = app
            .call("POST", &uri, Some(&worker_key), Some(json!({"content": "started"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["author_type"], "WORKER");
        assert_eq!(comment["author_id"], worker_id.to_string());

        let (status, comment) = app
            .call("POST", &uri, Some(&owner), Some(json!({"content": "thanks"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["author_type"], "USER");

        let (_, comments) = app.call("GET", &uri, Some(&owner), None).await;
        assert_eq!(comments.as_array().unwrap().len(), 2);

        let other_uri = format!("/api/forge/tasks/{}/comments", other["id"].as_str().unwrap());
        let (status, _) = app
            .call("POST", &other_uri, Some(&worker_key), Some(json!({"content": "hi"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

mod broadcasts {
    use super::*;

    /// Committed mutations reach the project scope; rejected ones do not.
    #[tokio::test]
    async fn test_mutations_are_broadcast() {
        let app = TestApp::new();
        let owner = app.register("ada").await;
        let (worker_id, worker_key) = app.create_worker(&owner, "indexer").await;
        let project = app.create_project(&owner, "archive").await;

        let (sub, mut rx) = Subscriber::channel(16);
        app.state.registry.connect(Scope::Project(project), sub);

        let task = app.create_task(&owner, project, Some(worker_id)).await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "TASK_CREATED");
        assert_eq!(frame["payload"], task);

        let uri = format!("/api/forge/tasks/{}", task["id"].as_str().unwrap());
        let (status, _) = app
            .call("PATCH", &uri, Some(&worker_key), Some(json!({"title": "nope"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err(), "rejected update must not broadcast");

        let (_, updated) = app
            .call("PATCH", &uri, Some(&worker_key), Some(json!({"status": "done"})))
            .await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "TASK_UPDATED");
        assert_eq!(frame["payload"], updated);

        app.call("DELETE", &uri, Some(&owner), None).await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "TASK_DELETED");

        app.call("POST", &format!("{}/restore", uri), Some(&owner), None).await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "TASK_RESTORED");

        app.call("POST", &format!("{}/comments", uri), Some(&owner), Some(json!({"content": "ok"})))
            .await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "COMMENT_CREATED");
        assert_eq!(frame["payload"]["content"], "ok");
    }
}

mod throttle {
    use super::*;

    /// Auth endpoints return 429 once an address exceeds the limit.
    #[tokio::test]
    async fn test_login_is_rate_limited_per_ip() {
        let mut config = Config::for_tests();
        config.rate_limit = 2;
        let app = TestApp::with_config(config);
        let router = app
            .router
            .clone()
            .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 7], 4000))));

        let body = json!({"username": "nobody", "password": "whatever1"});
        for _ in 0..2 {
            let (status, _) = send(&router, "POST", "/api/forge/auth/login", None, Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, body) = send(&router, "POST", "/api/forge/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_error(&body, "RATE_LIMITED", StatusCode::TOO_MANY_REQUESTS);

        // other endpoints are not throttled
        let (status, _) = send(&router, "GET", "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

mod observability {
    use super::*;

    /// `/metrics` serves the Prometheus text format.
    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = TestApp::new();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("forge_ws_connections"));
        assert!(text.contains("forge_broadcast_messages_total"));
    }
}
