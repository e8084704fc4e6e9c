use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION};
use chrono::{TimeDelta, Utc};
use keeper_server::auth::{DEFAULT_TOKEN_TTL, TokenService};
use keeper_server::store::StoreKind;
use keeper_server::{AppState, ServerConfig};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    #[allow(dead_code)]
    pub state: AppState,
    tokens: TokenService,
    _dir: Option<TempDir>,
}

pub struct TestResponse {
    pub status: StatusCode,
    #[allow(dead_code)]
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|err| {
            panic!(
                "response is not json ({err}): {} {}",
                self.status,
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    pub fn expect(self, status: StatusCode) -> Self {
        if self.status != status {
            panic!(
                "unexpected status: {} (wanted {status}) {}",
                self.status,
                String::from_utf8_lossy(&self.body)
            );
        }
        self
    }
}

impl TestApp {
    pub async fn memory() -> Self {
        let config = ServerConfig {
            store: StoreKind::Memory,
            token_secret: Some(TEST_SECRET.into()),
            ..ServerConfig::default()
        };
        Self::from_config(config, None).await
    }

    pub async fn sqlite() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = ServerConfig {
            store: StoreKind::Sqlite,
            database_url: format!("sqlite://{}", dir.path().join("keeper.db").display()),
            token_secret: Some(TEST_SECRET.into()),
            ..ServerConfig::default()
        };
        Self::from_config(config, Some(dir)).await
    }

    async fn from_config(config: ServerConfig, dir: Option<TempDir>) -> Self {
        let state = keeper_server::build_state(&config).await.expect("state");
        let router = keeper_server::http::router(state.clone());
        Self {
            router,
            state,
            tokens: TokenService::new(TEST_SECRET.as_bytes(), DEFAULT_TOKEN_TTL),
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn register(&self, login: &str, password: &str) -> String {
        let body = serde_json::json!({ "login": login, "password": password });
        let response = self
            .send(post_json("/api/user/register", None, &body))
            .await
            .expect(StatusCode::CREATED);
        response.json()["token"]
            .as_str()
            .expect("token field")
            .to_string()
    }

    /// A correctly signed token for `user_id` that expired an hour ago.
    pub fn expired_token(&self, user_id: u64) -> String {
        let issued_at = Utc::now() - TimeDelta::hours(4);
        self.tokens
            .issue_at(user_id, issued_at)
            .expect("issue token")
            .token
    }
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}
