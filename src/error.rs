use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::CredentialError;
use crate::media::UploadError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Credential(CredentialError::InvalidToken(_)) => StatusCode::UNAUTHORIZED,
            AppError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(
                UploadError::MissingPath | UploadError::NotFound(_) | UploadError::Multipart(_),
            ) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::Remote { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Upload(UploadError::Spool(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Internal detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(e) if is_unique_violation(e) => {
                "user with this email or username already exists".into()
            }
            AppError::Database(sqlx::Error::RowNotFound) => "not found".into(),
            AppError::Database(_) | AppError::Internal(_) => "internal server error".into(),
            AppError::Credential(CredentialError::InvalidToken(_)) => {
                "invalid or expired token".into()
            }
            AppError::Credential(_) => "credential operation failed".into(),
            AppError::Upload(UploadError::Remote { .. }) => "media upload failed".into(),
            other => other.to_string(),
        }
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

/// Uniform JSON envelope for every response body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: Option<T>,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data: Some(data),
            message: message.into(),
            success: status.is_success(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        let body = ApiResponse::<()> {
            status_code: status.as_u16(),
            data: None,
            message: self.public_message(),
            success: false,
        };
        (status, Json(body)).into_response()
    }
}
