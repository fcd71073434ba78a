//! Gateway HTTP wire types (image upload/delete) and error responses.
//!
//! The chat WebSocket protocol itself lives in `relay` (`InboundRequest`, sentinel frame).

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Body of POST /delete-image: `{ "filename": "<unix>_<name>" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteImageRequest {
    pub filename: String,
}

/// Response of POST /upload: `{ "errno": 0, "data": "<url>" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub errno: i32,
    pub data: String,
}

impl UploadResponse {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            errno: 0,
            data: url.into(),
        }
    }
}

/// Handler error rendered as `{ "error": message }` with the matching status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<crate::storage::StorageError> for ApiError {
    fn from(err: crate::storage::StorageError) -> Self {
        match err {
            crate::storage::StorageError::InvalidKey(key) => {
                ApiError::BadRequest(format!("invalid object key: {}", key))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Body-limit failures while reading a multipart upload are 413; anything else is a
/// malformed request.
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
