mod support;

use axum::{
    body::Body,
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN},
        Method, Request, StatusCode,
    },
};
use parley_config::AppConfig;
use parley_relay::ClientEvent;
use serde_json::json;
use std::io;
use std::sync::{Arc, Mutex};
use support::{TestContext, TestResult};
use tower::ServiceExt;

#[tokio::test]
async fn health_reports_ok() -> TestResult {
    let ctx = TestContext::new().await?;

    let (status, body) = ctx.request(Method::GET, "/health", None, None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    Ok(())
}

#[tokio::test]
async fn register_login_me_and_logout() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("Alice@Example.com").await?;

    let (status, me) = ctx
        .request(Method::GET, "/api/auth/me", Some(&alice.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], alice.id.as_str());
    assert_eq!(me["email"], "alice@example.com");

    let (status, session) = ctx
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "alice@example.com", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(session["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(session["expires_at"].is_string());

    let (status, _) = ctx
        .request(Method::POST, "/api/auth/logout", Some(&alice.token), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = ctx
        .request(Method::GET, "/api/auth/me", Some(&alice.token), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_and_bad_password_are_rejected() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.register("bob@example.com").await?;

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "bob@example.com", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "bob@example.com", "password": "wrong-password"})),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "carol@example.com", "password": "123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn api_routes_require_a_bearer_token() -> TestResult {
    let ctx = TestContext::new().await?;

    for (method, uri) in [
        (Method::GET, "/api/chats"),
        (Method::GET, "/api/presence"),
        (Method::GET, "/api/messages/anything"),
    ] {
        let (status, _) = ctx.request(method, uri, None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let (status, _) = ctx
        .request(Method::GET, "/api/chats", Some("not-a-session"), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn chat_creation_is_idempotent_in_either_direction() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;
    let bob = ctx.register("bob@example.com").await?;

    let first = ctx.open_chat(&alice, &bob).await?;
    let again = ctx.open_chat(&alice, &bob).await?;
    let reverse = ctx.open_chat(&bob, &alice).await?;
    assert_eq!(first, again);
    assert_eq!(first, reverse);

    for account in [&alice, &bob] {
        let (status, body) = ctx
            .request(Method::GET, "/api/chats", Some(&account.token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        let chats = body["chats"].as_array().cloned().unwrap_or_default();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["id"], first.as_str());
        assert_eq!(chats[0]["participants"], json!([alice.id, bob.id]));
    }
    Ok(())
}

#[tokio::test]
async fn chat_with_self_or_unknown_peer_is_rejected() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/chats",
            Some(&alice.token),
            Some(json!({"peer_id": alice.id})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/chats",
            Some(&alice.token),
            Some(json!({"peer_id": "nobody"})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/chats",
            Some(&alice.token),
            Some(json!({"peer_id": "  "})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn message_for_offline_peer_is_in_the_log() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;
    let bob = ctx.register("bob@example.com").await?;
    let chat_id = ctx.open_chat(&alice, &bob).await?;

    let (status, body) = ctx
        .request(
            Method::POST,
            "/api/messages",
            Some(&alice.token),
            Some(json!({
                "chat_id": chat_id,
                "content": "  hello  ",
                "client_message_id": "m-1"
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["content"], "hello");
    assert_eq!(body["message"]["client_message_id"], "m-1");

    let (status, body) = ctx
        .request(
            Method::GET,
            &format!("/api/messages/{chat_id}"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[0]["sender_id"], alice.id.as_str());
    assert_eq!(messages[0]["chat_id"], chat_id.as_str());
    Ok(())
}

#[tokio::test]
async fn append_rejects_blank_content_and_outsiders() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;
    let bob = ctx.register("bob@example.com").await?;
    let carol = ctx.register("carol@example.com").await?;
    let chat_id = ctx.open_chat(&alice, &bob).await?;

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/messages",
            Some(&alice.token),
            Some(json!({"chat_id": chat_id, "content": " \n\t "})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/messages",
            Some(&carol.token),
            Some(json!({"chat_id": chat_id, "content": "let me in"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::POST,
            "/api/messages",
            Some(&alice.token),
            Some(json!({"chat_id": "missing", "content": "hi"})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .request(
            Method::GET,
            &format!("/api/messages/{chat_id}"),
            Some(&carol.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request(Method::GET, "/api/messages/missing", Some(&alice.token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(ctx.services.messages.count_for_chat(&chat_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn presence_lists_identified_relay_users() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;
    let relay = &ctx.services.relay;

    let (mut connection, _inbox) = relay.connect(Some(alice.id.clone())).await;
    relay
        .dispatch(&mut connection, ClientEvent::Identify(alice.id.clone()))
        .await;

    let (status, body) = ctx
        .request(Method::GET, "/api/presence", Some(&alice.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"], json!([alice.id]));

    relay.disconnect(&mut connection).await;
    let (_, body) = ctx
        .request(Method::GET, "/api/presence", Some(&alice.token), None)
        .await?;
    assert_eq!(body["users"], json!([]));
    Ok(())
}

#[tokio::test]
async fn openapi_document_lists_routes() -> TestResult {
    let ctx = TestContext::new().await?;

    let (status, body) = ctx
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await?;

    assert_eq!(status, StatusCode::OK);
    for path in ["/api/chats", "/api/messages", "/api/messages/{chat_id}", "/ws"] {
        assert!(body["paths"][path].is_object(), "missing {path}");
    }
    assert!(body["components"]["securitySchemes"]["bearerAuth"].is_object());
    Ok(())
}

#[tokio::test]
async fn cors_preflight_honours_allowed_origins() -> TestResult {
    let mut config = AppConfig::default();
    config.http.allowed_origins = vec!["http://localhost:5173".into()];
    let ctx = TestContext::with_config(config).await?;

    let preflight = |origin: &'static str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/chats")
            .header(ORIGIN, origin)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
    };

    let response = ctx.router().oneshot(preflight("http://localhost:5173")?).await?;
    assert_eq!(
        response
            .headers()
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:5173")
    );

    let response = ctx.router().oneshot(preflight("http://evil.test")?).await?;
    assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    Ok(())
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn request_traces_leave_out_the_session_token() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.register("alice@example.com").await?;

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let request = Request::builder()
        .uri(format!("/ws?token={}", alice.token))
        .body(Body::empty())?;
    ctx.router().oneshot(request).await?;

    let output = logs.contents();
    assert!(output.contains("path=/ws"), "request span missing: {output}");
    assert!(!output.contains(&alice.token));
    Ok(())
}
