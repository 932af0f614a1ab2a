use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use axum::http::StatusCode;
use choreboard_server::{server, storage};
use reqwest::Client;
use serde_json::{Value, json};

const LOGIN_PATH: &str = "/api/v1/auth/login";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                LOGIN_PATH,
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PATCH" => self.client.patch(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }

    /// Logs in as the seeded admin and creates one parent and one child
    /// account. Returns (admin, parent, child) tokens plus the child's id.
    async fn standard_family(&self) -> (String, String, String, i64) {
        let admin = self.login("admin", "admin123").await;
        self.request_expect(
            "POST",
            "/api/v1/users",
            Some(&admin),
            Some(json!({
                "username": "mom", "display_name": "Mom",
                "role": "PARENT", "password": "secret123"
            })),
            StatusCode::CREATED,
        )
        .await;
        let child = self
            .request_expect(
                "POST",
                "/api/v1/users",
                Some(&admin),
                Some(json!({
                    "username": "alice", "display_name": "Alice",
                    "role": "CHILD", "password": "kidpass"
                })),
                StatusCode::CREATED,
            )
            .await;
        let child_id = child.get("id").unwrap().as_i64().unwrap();
        let parent = self.login("mom", "secret123").await;
        let child = self.login("alice", "kidpass").await;
        (admin, parent, child, child_id)
    }

    /// Runs one chore through create → done → approve, crediting the child.
    async fn earn_points(&self, parent: &str, child: &str, child_id: i64, points: i64) {
        let chore = self
            .request_expect(
                "POST",
                "/api/v1/chores",
                Some(parent),
                Some(json!({
                    "title": "Earn", "points": points, "assignee_ids": [child_id]
                })),
                StatusCode::CREATED,
            )
            .await;
        let id = chore.get("id").unwrap().as_i64().unwrap();
        self.request_expect(
            "POST",
            &format!("/api/v1/chores/{id}/done"),
            Some(child),
            None,
            StatusCode::OK,
        )
        .await;
        self.request_expect(
            "POST",
            &format!("/api/v1/chores/{id}/approve"),
            Some(parent),
            Some(json!({})),
            StatusCode::OK,
        )
        .await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let config = server::AppConfig {
        jwt_secret: "testsecret".into(),
        listen_port: None,
        dev_cors_origin: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store.ensure_admin_seed().await.expect("seed");

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn public_endpoints_and_seeded_admin() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;

    let token = server.login("admin", "admin123").await;
    assert!(!token.is_empty());
    let me = server
        .request_expect("GET", "/api/v1/me", Some(&token), None, StatusCode::OK)
        .await;
    assert_eq!(me.get("username").unwrap(), "admin");
    assert_eq!(me.get("role").unwrap(), "ADMIN");
    assert_eq!(me.get("must_change_password").unwrap(), true);

    server
        .request_expect(
            "POST",
            LOGIN_PATH,
            None,
            Some(json!({"username": "admin", "password": "wrong"})),
            StatusCode::UNAUTHORIZED,
        )
        .await;
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, &str, Option<Value>)> = vec![
        ("GET", "/api/v1/me", None),
        ("GET", "/api/v1/users", None),
        ("GET", "/api/v1/chores", None),
        ("POST", "/api/v1/chores", Some(json!({"title": "x"}))),
        ("GET", "/api/v1/approvals", None),
        ("GET", "/api/v1/rewards", None),
        ("GET", "/api/v1/redemptions", None),
        ("GET", "/api/v1/ledger", None),
    ];
    for (method, path, body) in cases {
        server
            .request_expect(method, path, None, body, StatusCode::UNAUTHORIZED)
            .await;
    }
    // Garbage token is rejected too.
    server
        .request_expect(
            "GET",
            "/api/v1/me",
            Some("not-a-jwt"),
            None,
            StatusCode::UNAUTHORIZED,
        )
        .await;
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (admin, parent, child, child_id) = server.standard_family().await;

    // Duplicate username conflicts.
    server
        .request_expect(
            "POST",
            "/api/v1/users",
            Some(&admin),
            Some(json!({
                "username": "alice", "display_name": "Other Alice",
                "role": "CHILD", "password": "x"
            })),
            StatusCode::CONFLICT,
        )
        .await;
    // Unknown role is a validation error, not a deserialization failure.
    server
        .request_expect(
            "POST",
            "/api/v1/users",
            Some(&admin),
            Some(json!({
                "username": "bob", "display_name": "Bob",
                "role": "GRANDPARENT", "password": "x"
            })),
            StatusCode::BAD_REQUEST,
        )
        .await;

    for token in [&parent, &child] {
        server
            .request_expect("GET", "/api/v1/users", Some(token), None, StatusCode::FORBIDDEN)
            .await;
        server
            .request_expect(
                "POST",
                "/api/v1/users",
                Some(token),
                Some(json!({
                    "username": "eve", "display_name": "Eve",
                    "role": "CHILD", "password": "x"
                })),
                StatusCode::FORBIDDEN,
            )
            .await;
    }

    // Admin resets the child's password; the child must use the new one and
    // sees the must_change_password flag until they change it themselves.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/users/{child_id}/password"),
            Some(&admin),
            Some(json!({"new_password": "fresh-pass"})),
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "POST",
            LOGIN_PATH,
            None,
            Some(json!({"username": "alice", "password": "kidpass"})),
            StatusCode::UNAUTHORIZED,
        )
        .await;
    let child = server.login("alice", "fresh-pass").await;
    let me = server
        .request_expect("GET", "/api/v1/me", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(me.get("must_change_password").unwrap(), true);
    server
        .request_expect(
            "POST",
            "/api/v1/me/password",
            Some(&child),
            Some(json!({"old_password": "fresh-pass", "new_password": "own-pass"})),
            StatusCode::NO_CONTENT,
        )
        .await;
    let me = server
        .request_expect("GET", "/api/v1/me", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(me.get("must_change_password").unwrap(), false);

    // Deactivated users cannot log in, and existing tokens die.
    server
        .request_expect(
            "PATCH",
            &format!("/api/v1/users/{child_id}"),
            Some(&admin),
            Some(json!({"is_active": false})),
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            LOGIN_PATH,
            None,
            Some(json!({"username": "alice", "password": "own-pass"})),
            StatusCode::UNAUTHORIZED,
        )
        .await;
    server
        .request_expect("GET", "/api/v1/me", Some(&child), None, StatusCode::UNAUTHORIZED)
        .await;
}

#[tokio::test]
async fn chore_lifecycle_end_to_end() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (_admin, parent, child, child_id) = server.standard_family().await;

    // Children cannot create chores.
    server
        .request_expect(
            "POST",
            "/api/v1/chores",
            Some(&child),
            Some(json!({"title": "Nope", "points": 1, "assignee_ids": [child_id]})),
            StatusCode::FORBIDDEN,
        )
        .await;

    let chore = server
        .request_expect(
            "POST",
            "/api/v1/chores",
            Some(&parent),
            Some(json!({
                "title": "Dishes", "points": 10, "assignee_ids": [child_id],
                "recurrence": "DAILY", "due_date": "2024-01-10"
            })),
            StatusCode::CREATED,
        )
        .await;
    let chore_id = chore.get("id").unwrap().as_i64().unwrap();
    assert_eq!(chore.get("status").unwrap(), "ASSIGNED");
    assert_eq!(chore.get("events").unwrap().as_array().unwrap().len(), 1);

    // Approving an ASSIGNED chore is an invalid transition.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/approve"),
            Some(&parent),
            Some(json!({})),
            StatusCode::BAD_REQUEST,
        )
        .await;
    // Parents cannot mark chores done.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/done"),
            Some(&parent),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;

    let done = server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/done"),
            Some(&child),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(done.get("status").unwrap(), "DONE_PENDING");

    // The approvals queue now contains it.
    let queue = server
        .request_expect("GET", "/api/v1/approvals", Some(&parent), None, StatusCode::OK)
        .await;
    assert_eq!(queue.as_array().unwrap().len(), 1);

    // Reject with a note; chore can be resubmitted.
    let rejected = server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/reject"),
            Some(&parent),
            Some(json!({"note": "not clean"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(rejected.get("status").unwrap(), "REJECTED");
    let events = rejected.get("events").unwrap().as_array().unwrap();
    assert_eq!(events[0].get("note").unwrap(), "not clean");

    server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/done"),
            Some(&child),
            None,
            StatusCode::OK,
        )
        .await;
    let approved = server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/approve"),
            Some(&parent),
            Some(json!({})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(approved.get("status").unwrap(), "APPROVED");

    // The child was credited exactly once.
    let ledger = server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(ledger.get("total").unwrap().as_i64().unwrap(), 10);
    let entries = ledger.get("entries").unwrap().as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].get("ref_type").unwrap(), "CHORE");

    // Double approval fails and does not double-credit.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{chore_id}/approve"),
            Some(&parent),
            Some(json!({})),
            StatusCode::BAD_REQUEST,
        )
        .await;
    let ledger = server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(ledger.get("total").unwrap().as_i64().unwrap(), 10);

    // Daily recurrence spawned a successor due the next day.
    let chores = server
        .request_expect(
            "GET",
            "/api/v1/chores?status=ASSIGNED",
            Some(&parent),
            None,
            StatusCode::OK,
        )
        .await;
    let assigned = chores.as_array().unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].get("title").unwrap(), "Dishes");
    assert_eq!(assigned[0].get("due_date").unwrap(), "2024-01-11");
}

#[tokio::test]
async fn redemption_flow_with_limits() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (_admin, parent, child, child_id) = server.standard_family().await;

    let reward = server
        .request_expect(
            "POST",
            "/api/v1/rewards",
            Some(&parent),
            Some(json!({"name": "Movie night", "cost": 8, "limit_per_week": 1})),
            StatusCode::CREATED,
        )
        .await;
    let reward_id = reward.get("id").unwrap().as_i64().unwrap();

    // No points yet: request fails, nothing is created.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/rewards/{reward_id}/redeem"),
            Some(&child),
            Some(json!({})),
            StatusCode::BAD_REQUEST,
        )
        .await;
    // Parents cannot redeem.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/rewards/{reward_id}/redeem"),
            Some(&parent),
            Some(json!({})),
            StatusCode::FORBIDDEN,
        )
        .await;

    server.earn_points(&parent, &child, child_id, 20).await;

    let redemption = server
        .request_expect(
            "POST",
            &format!("/api/v1/rewards/{reward_id}/redeem"),
            Some(&child),
            Some(json!({})),
            StatusCode::CREATED,
        )
        .await;
    let redemption_id = redemption.get("id").unwrap().as_i64().unwrap();
    assert_eq!(redemption.get("status").unwrap(), "REQUESTED");
    assert_eq!(redemption.get("reward_name").unwrap(), "Movie night");

    // Requesting holds no points in escrow.
    let ledger = server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(ledger.get("total").unwrap().as_i64().unwrap(), 20);

    // Children cannot handle redemptions.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/redemptions/{redemption_id}/approve"),
            Some(&child),
            Some(json!({})),
            StatusCode::FORBIDDEN,
        )
        .await;

    let approved = server
        .request_expect(
            "POST",
            &format!("/api/v1/redemptions/{redemption_id}/approve"),
            Some(&parent),
            Some(json!({"note": "Enjoy the movie"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(approved.get("status").unwrap(), "APPROVED");
    assert_eq!(approved.get("note").unwrap(), "Enjoy the movie");
    let ledger = server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(ledger.get("total").unwrap().as_i64().unwrap(), 12);
    assert_eq!(
        ledger.get("entries").unwrap().as_array().unwrap()[0]
            .get("delta")
            .unwrap()
            .as_i64()
            .unwrap(),
        -8
    );

    // One approved redemption this week: the weekly limit now blocks new
    // requests for the same reward.
    server
        .request_expect(
            "POST",
            &format!("/api/v1/rewards/{reward_id}/redeem"),
            Some(&child),
            Some(json!({})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    // A second, unlimited reward can still be requested and denied without
    // touching the balance.
    let candy = server
        .request_expect(
            "POST",
            "/api/v1/rewards",
            Some(&parent),
            Some(json!({"name": "Candy", "cost": 3})),
            StatusCode::CREATED,
        )
        .await;
    let candy_id = candy.get("id").unwrap().as_i64().unwrap();
    let requested = server
        .request_expect(
            "POST",
            &format!("/api/v1/rewards/{candy_id}/redeem"),
            Some(&child),
            Some(json!({})),
            StatusCode::CREATED,
        )
        .await;
    let requested_id = requested.get("id").unwrap().as_i64().unwrap();
    let denied = server
        .request_expect(
            "POST",
            &format!("/api/v1/redemptions/{requested_id}/deny"),
            Some(&parent),
            Some(json!({})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(denied.get("status").unwrap(), "DENIED");
    // No reviewer note supplied, so the default text is stored.
    assert_eq!(denied.get("note").unwrap(), "Denied");
    let ledger = server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    assert_eq!(ledger.get("total").unwrap().as_i64().unwrap(), 12);
}

#[tokio::test]
async fn ledger_access_is_scoped() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (admin, parent, child, child_id) = server.standard_family().await;

    // A child reads their own ledger implicitly, or by naming themselves.
    server
        .request_expect("GET", "/api/v1/ledger", Some(&child), None, StatusCode::OK)
        .await;
    server
        .request_expect(
            "GET",
            &format!("/api/v1/ledger?user_id={child_id}"),
            Some(&child),
            None,
            StatusCode::OK,
        )
        .await;
    // Anyone else's is off limits.
    server
        .request_expect(
            "GET",
            "/api/v1/ledger?user_id=1",
            Some(&child),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;

    // Parents and admins must name a child.
    server
        .request_expect("GET", "/api/v1/ledger", Some(&parent), None, StatusCode::BAD_REQUEST)
        .await;
    server
        .request_expect(
            "GET",
            "/api/v1/ledger?user_id=1",
            Some(&admin),
            None,
            StatusCode::BAD_REQUEST,
        )
        .await;
    let ledger = server
        .request_expect(
            "GET",
            &format!("/api/v1/ledger?user_id={child_id}"),
            Some(&parent),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        ledger.get("user_id").unwrap().as_i64().unwrap(),
        child_id
    );
}

#[tokio::test]
async fn child_visibility_is_scoped_to_assignments() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (admin, parent, child, child_id) = server.standard_family().await;
    let other = server
        .request_expect(
            "POST",
            "/api/v1/users",
            Some(&admin),
            Some(json!({
                "username": "bob", "display_name": "Bob",
                "role": "CHILD", "password": "bobpass"
            })),
            StatusCode::CREATED,
        )
        .await;
    let other_id = other.get("id").unwrap().as_i64().unwrap();

    server
        .request_expect(
            "POST",
            "/api/v1/chores",
            Some(&parent),
            Some(json!({"title": "Alice only", "points": 5, "assignee_ids": [child_id]})),
            StatusCode::CREATED,
        )
        .await;
    let bobs = server
        .request_expect(
            "POST",
            "/api/v1/chores",
            Some(&parent),
            Some(json!({"title": "Bob only", "points": 5, "assignee_ids": [other_id]})),
            StatusCode::CREATED,
        )
        .await;
    let bobs_id = bobs.get("id").unwrap().as_i64().unwrap();

    let mine = server
        .request_expect("GET", "/api/v1/chores", Some(&child), None, StatusCode::OK)
        .await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].get("title").unwrap(), "Alice only");

    // Alice can neither view nor complete Bob's chore.
    server
        .request_expect(
            "GET",
            &format!("/api/v1/chores/{bobs_id}"),
            Some(&child),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;
    server
        .request_expect(
            "POST",
            &format!("/api/v1/chores/{bobs_id}/done"),
            Some(&child),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;

    // Parents see everything.
    let all = server
        .request_expect("GET", "/api/v1/chores", Some(&parent), None, StatusCode::OK)
        .await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let token = server.login("admin", "admin123").await;
    server
        .request_expect("GET", "/api/v1/me", Some(&token), None, StatusCode::OK)
        .await;
    server
        .request_expect(
            "POST",
            "/api/v1/auth/logout",
            Some(&token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect("GET", "/api/v1/me", Some(&token), None, StatusCode::UNAUTHORIZED)
        .await;
}
