use crate::{Result, SdkError};
use keeper_core::{Credentials, DataRecord, ErrorResponse, RecordRequest, TokenResponse};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// HTTP client for the keeper REST API.
///
/// Build one per process and hand it to whatever needs to talk to the
/// server; the underlying connection pool is shared by clones.
#[derive(Clone)]
pub struct HttpClient {
    base_url: Url,
    client: reqwest::Client,
    token: Option<String>,
    timeout: Duration,
}

impl HttpClient {
    /// Build a new client using the provided base URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(base_url.as_ref())
            .map_err(|err| SdkError::InvalidResponse(format!("invalid base url: {err}")))?;
        if url.cannot_be_a_base() {
            return Err(SdkError::InvalidResponse(format!(
                "invalid base url: {url}"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("keeper-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: url,
            client,
            token: None,
            timeout: Duration::from_secs(10),
        })
    }

    /// Attach a bearer token that will be sent with each request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the request timeout (default 10 seconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create an account and return its first session token.
    pub async fn register(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let url = self.endpoint(&["api", "user", "register"])?;
        let builder = self.client.post(url).timeout(self.timeout).json(credentials);
        let response = ensure_success(builder.send().await?).await?;
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Exchange credentials for a session token.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let url = self.endpoint(&["api", "user", "login"])?;
        let builder = self.client.post(url).timeout(self.timeout).json(credentials);
        let response = ensure_success(builder.send().await?).await?;
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Store a record; the server answers with the authoritative copy.
    pub async fn put_record(&self, request: &RecordRequest) -> Result<DataRecord> {
        let url = self.endpoint(&["api", "user", "records"])?;
        let builder = self.client.post(url).timeout(self.timeout).json(request);
        let response = ensure_success(self.apply_auth(builder).send().await?).await?;
        Ok(response.json::<DataRecord>().await?)
    }

    /// Fetch a record by name, `None` when the server does not know it.
    pub async fn get_record(&self, name: &str) -> Result<Option<DataRecord>> {
        let url = self.endpoint(&["api", "user", "records", name])?;
        let builder = self.client.get(url).timeout(self.timeout);
        let response = self.apply_auth(builder).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        Ok(Some(response.json::<DataRecord>().await?))
    }

    /// List every record of the session's user. An empty account yields an
    /// empty list.
    pub async fn list_records(&self) -> Result<Vec<DataRecord>> {
        let url = self.endpoint(&["api", "user", "records", "list"])?;
        let builder = self.client.get(url).timeout(self.timeout);
        let response = ensure_success(self.apply_auth(builder).send().await?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!("server reported no records");
            return Ok(Vec::new());
        }
        Ok(response.json::<Vec<DataRecord>>().await?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SdkError::InvalidResponse(format!("invalid base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            builder.bearer_auth(token)
        } else {
            builder
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let bytes = response.bytes().await?;
    let message = match serde_json::from_slice::<ErrorResponse>(&bytes) {
        Ok(err) => err.message,
        Err(_) => String::from_utf8_lossy(&bytes).to_string(),
    };
    if status == StatusCode::UNAUTHORIZED {
        return Err(SdkError::Unauthorized(message));
    }
    Err(SdkError::Server {
        status: status.as_u16(),
        message,
    })
}
