use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing::get, routing::post};
use keeper_core::{Credentials, RecordRequest};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::auth::{self, AuthContext};
use crate::error::{AppError, attach_correlation};
use crate::state::AppState;
use crate::telemetry::{CorrelationId, correlation_layer, request_span};

pub fn router(state: AppState) -> Router {
    let records = record_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::http_layer,
    ));

    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .merge(records)
        .layer(middleware::from_fn(correlation_layer))
        .with_state(state)
}

fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/records", post(put_record))
        .route("/api/user/records/", post(put_record))
        .route("/api/user/records/list", get(list_records))
        .route("/api/user/records/{name}", get(get_record))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Decodes a JSON body, reporting any failure as 400 rather than axum's 415/422.
fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("malformed request body: {err}")))
}

async fn register(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.register", &correlation.0);
    async move {
        let credentials: Credentials = decode_json(&body)?;
        let response = state.accounts.register(credentials).await?;
        Ok((StatusCode::CREATED, Json(response)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn login(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.login", &correlation.0);
    async move {
        let credentials: Credentials = decode_json(&body)?;
        let response = state.accounts.login(credentials).await?;
        Ok((StatusCode::OK, Json(response)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn put_record(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.put_record", &correlation.0);
    async move {
        let request: RecordRequest = decode_json(&body)?;
        let record = state.records.put(auth.user_id, request).await?;
        Ok((StatusCode::CREATED, Json(record)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn get_record(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.get_record", &correlation.0);
    async move {
        let record = state.records.get(auth.user_id, &name).await?;
        Ok(Json(record))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn list_records(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, AppError> {
    let span = request_span("http.list_records", &correlation.0);
    async move {
        let records = state.records.list(auth.user_id).await?;
        if records.is_empty() {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        Ok((StatusCode::OK, Json(records)).into_response())
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}
