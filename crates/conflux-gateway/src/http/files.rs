//! `POST /api/files/upload` (multipart), `GET /api/files/{link_id}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use conflux_core::types::FileLinkId;
use serde::Serialize;

use crate::app::AppState;
use crate::http::{authenticate, bad_request, error_response, parse_id, ApiError};

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub link_id: String,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;

    let mut filename = None;
    let mut content_type = None;
    let mut bytes: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            content_type = field.content_type().map(str::to_string);
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed reading upload: {e}")))?,
            );
        }
    }

    let bytes = bytes.ok_or_else(|| bad_request("missing 'file' field"))?;
    if bytes.len() as u64 > state.config.files.max_upload_bytes {
        return Err(error_response(conflux_core::error::ConfluxError::PayloadTooLarge {
            size: bytes.len(),
            max: state.config.files.max_upload_bytes as usize,
        }));
    }
    let filename = filename.unwrap_or_else(|| "upload".to_string());
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let (file_id, link_id) = state
        .files
        .upload(&filename, &content_type, &bytes, user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(UploadResponse {
        file_id: file_id.to_string(),
        link_id: link_id.to_string(),
    }))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(link_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let link_id: FileLinkId = parse_id(&link_id, "file link id")?;

    let (file, bytes) = state
        .files
        .download(&link_id, &user_id)
        .await
        .map_err(error_response)?;

    let headers = [
        (axum::http::header::CONTENT_TYPE, file.content_type.clone()),
        (
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        ),
    ];
    Ok((headers, bytes))
}
