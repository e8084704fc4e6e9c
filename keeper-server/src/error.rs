use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keeper_core::ErrorResponse;
use thiserror::Error;
use tracing::error;

use crate::auth::TokenError;
use crate::password::PasswordError;
use crate::store::StoreError;
use crate::telemetry::{CORRELATION_ID_HEADER, CorrelationId, header_value};

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unexpected error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    kind: AppErrorKind,
    correlation_id: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, id: String) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn kind(&self) -> &AppErrorKind {
        &self.kind
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            AppErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::NotFound => StatusCode::NOT_FOUND,
            AppErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::Conflict(_) => StatusCode::CONFLICT,
            AppErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::BadRequest(message.into()))
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Unauthorized(message.into()))
    }

    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Conflict(message.into()))
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self.kind {
            AppErrorKind::BadRequest(_) => ("bad_request", self.kind.to_string()),
            AppErrorKind::NotFound => ("not_found", self.kind.to_string()),
            AppErrorKind::Unauthorized(_) => ("unauthorized", self.kind.to_string()),
            AppErrorKind::Conflict(_) => ("conflict", self.kind.to_string()),
            AppErrorKind::Internal(detail) => {
                error!(
                    correlation_id = self.correlation_id.as_deref().unwrap_or("-"),
                    detail = %detail,
                    "request failed"
                );
                ("internal", "internal server error".to_string())
            }
        };
        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            correlation_id: self.correlation_id.clone(),
        });

        let mut response = (status, body).into_response();
        if let Some(id) = &self.correlation_id {
            response
                .headers_mut()
                .insert(CORRELATION_ID_HEADER, header_value(id));
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        let kind = match value {
            StoreError::DuplicateLogin => AppErrorKind::Conflict(value.to_string()),
            StoreError::DuplicateName(_) => AppErrorKind::Conflict(value.to_string()),
            StoreError::NotFound | StoreError::NoData => AppErrorKind::NotFound,
            StoreError::Backend(detail) => AppErrorKind::Internal(detail),
        };
        AppError::new(kind)
    }
}

impl From<TokenError> for AppError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Signing(detail) => AppError::internal(detail),
            other => AppError::unauthorized(other.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(value: PasswordError) -> Self {
        AppError::internal(value.to_string())
    }
}

impl From<keeper_core::Error> for AppError {
    fn from(value: keeper_core::Error) -> Self {
        AppError::bad_request(value.to_string())
    }
}

pub fn attach_correlation(err: AppError, correlation: &CorrelationId) -> AppError {
    err.with_correlation(correlation.0.clone())
}
