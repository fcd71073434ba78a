//! Image upload and delete handlers. Uploaded images land in the object store under
//! `uploads/<unix-seconds>_<basename>`; the returned URL is what clients put in `images`.

use crate::gateway::protocol::{ApiError, DeleteImageRequest, UploadResponse};
use crate::gateway::server::GatewayState;
use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    Json,
};
use serde_json::json;
use std::path::Path;

const UPLOAD_FIELD: &str = "image";
const UPLOAD_PREFIX: &str = "uploads";

/// Object key for an uploaded file: `uploads/<unix-seconds>_<basename>`.
/// Returns None when the client file name has no usable basename.
pub(crate) fn upload_key(file_name: &str, unix_secs: u64) -> Option<String> {
    let base = Path::new(file_name.trim()).file_name()?.to_str()?;
    // Windows clients may send backslash paths
    let base = base.rsplit('\\').next().unwrap_or(base).trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(format!("{}/{}_{}", UPLOAD_PREFIX, unix_secs, base))
}

/// Object key for a delete request. Names with path separators or `..` are refused.
pub(crate) fn delete_key(filename: &str) -> Option<String> {
    let name = filename.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    Some(format!("{}/{}", UPLOAD_PREFIX, name))
}

fn unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// POST /upload: multipart form with an `image` file field.
pub async fn upload_image(
    State(state): State<GatewayState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let key = upload_key(&file_name, unix_secs())
            .ok_or_else(|| ApiError::BadRequest("missing file name".to_string()))?;
        let content = field.bytes().await?;
        let url = state
            .store
            .put_object(&state.bucket, &key, content.to_vec())
            .await?;
        log::info!("uploaded {} ({} bytes)", key, content.len());
        return Ok(Json(UploadResponse::ok(url)));
    }
    Err(ApiError::BadRequest(format!(
        "missing multipart field \"{}\"",
        UPLOAD_FIELD
    )))
}

/// POST /delete-image: `{ "filename": ... }` as returned in the upload URL's last segment.
pub async fn delete_image(
    State(state): State<GatewayState>,
    body: Result<Json<DeleteImageRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let key = delete_key(&req.filename)
        .ok_or_else(|| ApiError::BadRequest("invalid filename".to_string()))?;
    state.store.delete_object(&state.bucket, &key).await?;
    log::info!("deleted {}", key);
    Ok(Json(json!({ "message": "deleted" })))
}
