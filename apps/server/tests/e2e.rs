use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use parley_config::AppConfig;
use parley_gateway::{build_router, AppState};
use parley_runtime::BackendServices;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    services: BackendServices,
    _db_dir: TempDir,
}

struct TestResponse {
    status: StatusCode,
    json: Value,
}

impl TestApp {
    async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir");
        let db_path = db_dir.path().join("parley-test.db");

        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", db_path.to_string_lossy());
        config.database.max_connections = 5;

        let services = BackendServices::initialise(&config)
            .await
            .expect("initialise backend services");

        let state = AppState::from_services(&services)
            .with_allowed_origins(config.http.allowed_origins.clone());
        let router = build_router(state);

        Self {
            router,
            services,
            _db_dir: db_dir,
        }
    }

    fn pool(&self) -> &SqlitePool {
        &self.services.db_pool
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            let bytes = serde_json::to_vec(&json_body).expect("serialize request body");
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(bytes)
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("dispatch request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect response body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, json }
    }

    /// Returns `(user id, token)`.
    async fn register(&self, email: &str) -> (String, String) {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                Some(json!({"email": email, "password": "password123"})),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json);
        (
            response.json["user"]["id"].as_str().expect("user id").to_string(),
            response.json["token"].as_str().expect("token").to_string(),
        )
    }

    async fn open_chat(&self, token: &str, peer: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/chats",
                Some(json!({"peer_id": peer})),
                Some(token),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json);
        response.json["chat"]["id"].as_str().expect("chat id").to_string()
    }

    async fn send(&self, token: &str, chat_id: &str, content: &str, client_id: &str) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/messages",
                Some(json!({
                    "chat_id": chat_id,
                    "content": content,
                    "client_message_id": client_id,
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json);
        response.json["message"].clone()
    }

    /// Insert a user and session row directly, bypassing registration.
    async fn insert_user_with_session(&self, email: &str, token: &str, expires_in: Duration) {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (public_id, email, display_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(format!("user-{}", token))
        .bind(email)
        .bind("Seeded")
        .bind(&now_str)
        .bind(&now_str)
        .execute(self.pool())
        .await
        .expect("insert user");

        let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(self.pool())
            .await
            .expect("fetch user id");

        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, token, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(&now_str)
        .bind((now + expires_in).to_rfc3339())
        .execute(self.pool())
        .await
        .expect("insert session");
    }
}

#[tokio::test]
async fn health_check_reports_no_connections() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["status"], "ok");
    assert_eq!(response.json["connections"], 0);
}

#[tokio::test]
async fn both_participants_read_the_same_log() {
    let app = TestApp::new().await;
    let (alice, alice_token) = app.register("alice@example.com").await;
    let (bob, bob_token) = app.register("bob@example.com").await;

    let chat_id = app.open_chat(&alice_token, &bob).await;
    assert_eq!(app.open_chat(&bob_token, &alice).await, chat_id);

    let first = app.send(&alice_token, &chat_id, "  hi bob  ", "c-1").await;
    assert_eq!(first["content"], "hi bob");
    assert_eq!(first["sender_id"], alice.as_str());
    app.send(&bob_token, &chat_id, "hi alice", "c-2").await;
    app.send(&alice_token, &chat_id, "how are you?", "c-3").await;

    let uri = format!("/api/messages/{chat_id}");
    let for_alice = app.request(Method::GET, &uri, None, Some(&alice_token)).await;
    let for_bob = app.request(Method::GET, &uri, None, Some(&bob_token)).await;
    assert_eq!(for_alice.status, StatusCode::OK);
    assert_eq!(for_alice.json, for_bob.json);

    let messages = for_alice.json["messages"].as_array().expect("messages");
    let client_ids: Vec<&str> = messages
        .iter()
        .map(|m| m["client_message_id"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(client_ids, vec!["c-1", "c-2", "c-3"]);

    let count = app
        .services
        .messages
        .count_for_chat(&chat_id)
        .await
        .expect("count messages");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn chats_are_listed_by_most_recent_activity() {
    let app = TestApp::new().await;
    let (_alice, alice_token) = app.register("alice@example.com").await;
    let (bob, _) = app.register("bob@example.com").await;
    let (carol, _) = app.register("carol@example.com").await;

    let with_bob = app.open_chat(&alice_token, &bob).await;
    let with_carol = app.open_chat(&alice_token, &carol).await;

    let listed = app.request(Method::GET, "/api/chats", None, Some(&alice_token)).await;
    let order: Vec<&str> = listed.json["chats"]
        .as_array()
        .expect("chats")
        .iter()
        .filter_map(|chat| chat["id"].as_str())
        .collect();
    assert_eq!(order, vec![with_carol.as_str(), with_bob.as_str()]);

    app.send(&alice_token, &with_bob, "bumps this chat", "c-1").await;

    let listed = app.request(Method::GET, "/api/chats", None, Some(&alice_token)).await;
    let order: Vec<&str> = listed.json["chats"]
        .as_array()
        .expect("chats")
        .iter()
        .filter_map(|chat| chat["id"].as_str())
        .collect();
    assert_eq!(order, vec![with_bob.as_str(), with_carol.as_str()]);

    let all = app.services.chats.list_all().await.expect("list all chats");
    assert_eq!(all[0].public_id, with_bob);
}

#[tokio::test]
async fn seeded_session_authenticates_until_it_expires() {
    let app = TestApp::new().await;
    app.insert_user_with_session("seed@example.com", "live-token", Duration::hours(1))
        .await;
    app.insert_user_with_session("stale@example.com", "stale-token", Duration::hours(-1))
        .await;

    let me = app
        .request(Method::GET, "/api/auth/me", None, Some("live-token"))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json["id"], "user-live-token");
    assert_eq!(me.json["display_name"], "Seeded");

    let expired = app
        .request(Method::GET, "/api/auth/me", None, Some("stale-token"))
        .await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE token = ?")
        .bind("stale-token")
        .fetch_one(app.pool())
        .await
        .expect("count sessions");
    assert_eq!(remaining, 0, "expired sessions are removed when presented");
}

#[tokio::test]
async fn logout_revokes_only_the_presented_session() {
    let app = TestApp::new().await;
    let (_, first_token) = app.register("alice@example.com").await;

    let login = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"email": "alice@example.com", "password": "password123"})),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let second_token = login.json["token"].as_str().expect("token").to_string();

    let logout = app
        .request(Method::POST, "/api/auth/logout", None, Some(&first_token))
        .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let revoked = app
        .request(Method::GET, "/api/auth/me", None, Some(&first_token))
        .await;
    assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);

    let still_valid = app
        .request(Method::GET, "/api/auth/me", None, Some(&second_token))
        .await;
    assert_eq!(still_valid.status, StatusCode::OK);
}
