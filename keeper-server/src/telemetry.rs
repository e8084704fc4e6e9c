use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::field::Empty;
use tracing::{Instrument, Span, info, info_span};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const MAX_CORRELATION_LEN: usize = 128;

/// Request-scoped id echoed in the `x-correlation-id` header, in error
/// bodies and on every log line of the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Reuses the caller's id when it is a short token of
    /// `[A-Za-z0-9._:-]`; anything else is replaced with a fresh one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| is_acceptable(value))
            .map(|value| Self(value.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_acceptable(value: &str) -> bool {
    (1..=MAX_CORRELATION_LEN).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

/// Header form of a correlation id. Ids that cannot be sent as a header
/// are replaced rather than dropped.
pub fn header_value(id: &str) -> HeaderValue {
    HeaderValue::from_str(id).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

/// JSON log output. `RUST_LOG` takes precedence over `default_level`.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };
    let json = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(filter).with(json).try_init();
    Ok(())
}

/// Middleware: assigns the correlation id, runs the request inside a
/// `request` span and stamps status and latency onto that span.
pub async fn correlation_layer(mut req: Request<Body>, next: Next) -> Response {
    let correlation = CorrelationId::from_headers(req.headers());
    let span = info_span!(
        "request",
        method = %req.method(),
        path = req.uri().path(),
        correlation_id = correlation.as_str(),
        status = Empty,
        latency_ms = Empty
    );
    req.extensions_mut().insert(correlation.clone());

    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    span.record("status", response.status().as_u16());
    span.record("latency_ms", latency_ms);
    span.in_scope(|| info!("request completed"));

    response
        .headers_mut()
        .insert(CORRELATION_ID_HEADER, header_value(correlation.as_str()));
    response
}

/// Span wrapping one service operation inside a request.
pub fn request_span(operation: &'static str, correlation_id: &str) -> Span {
    info_span!("keeper.op", operation, correlation_id)
}
