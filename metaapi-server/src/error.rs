//! API error type with IntoResponse
//!
//! Every error body has the shape `{"status": "error", "message": ...}`.
//! Database and storage failures are logged and answered generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metaapi_db::DbError;
use serde_json::json;

use crate::storage::StorageError;
use crate::validation::MissingFields;

#[derive(Debug)]
pub enum ApiError {
    /// Required request fields absent (400)
    MissingFields(MissingFields),

    /// Database failure (500, logged)
    Database(DbError),

    /// Object storage failure (502, logged)
    Storage(StorageError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::MissingFields(e) => e.to_string(),
            Self::Database(e) => {
                tracing::error!("Database error: {}", e);
                "an internal error occurred".to_string()
            }
            Self::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "object storage request failed".to_string()
            }
        };

        let body = json!({
            "status": "error",
            "message": message,
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<MissingFields> for ApiError {
    fn from(e: MissingFields) -> Self {
        Self::MissingFields(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        Self::Database(e)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
