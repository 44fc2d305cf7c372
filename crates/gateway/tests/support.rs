#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use parley_config::AppConfig;
use parley_gateway::{build_router, AppState};
use parley_runtime::BackendServices;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub type TestResult<T = ()> = anyhow::Result<T>;

pub struct TestContext {
    _temp_dir: TempDir,
    pub services: BackendServices,
    state: AppState,
}

pub struct Account {
    pub id: String,
    pub token: String,
}

impl TestContext {
    pub async fn new() -> TestResult<Self> {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(mut config: AppConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("gateway.sqlite");
        config.database.url = format!("sqlite://{}", db_path.display());
        config.database.max_connections = 5;

        let services = BackendServices::initialise(&config).await?;
        let state =
            AppState::from_services(&services).with_allowed_origins(config.http.allowed_origins);

        Ok(Self {
            _temp_dir: temp_dir,
            services,
            state,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        build_router(self.state())
    }

    /// Register through the API and return the new user's id and token.
    pub async fn register(&self, email: &str) -> TestResult<Account> {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({"email": email, "password": "password123"})),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {status} {body}");

        Ok(Account {
            id: body["user"]["id"].as_str().unwrap_or_default().to_string(),
            token: body["token"].as_str().unwrap_or_default().to_string(),
        })
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResult<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn open_chat(&self, account: &Account, peer: &Account) -> TestResult<String> {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/chats",
                Some(&account.token),
                Some(serde_json::json!({"peer_id": peer.id})),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "create chat failed: {status} {body}");
        Ok(body["chat"]["id"].as_str().unwrap_or_default().to_string())
    }
}
