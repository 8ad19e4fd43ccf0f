use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::auth::AuthUser;
use crate::media::{ImageUpload, PosterPage};
use crate::{ApiError, ApiResult, AppState};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct PosterParams {
    pub next_cursor: Option<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    caller: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<JsonValue>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        upload = Some(ImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload
        .filter(|u| !u.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let size = upload.bytes.len();
    let result = state.media.upload(upload).await?;
    info!(user_id = %caller.id, size, "Image uploaded");
    Ok(Json(result))
}

pub async fn posters(
    State(state): State<AppState>,
    Query(params): Query<PosterParams>,
) -> ApiResult<Json<PosterPage>> {
    let page = state
        .media
        .list_posters(params.next_cursor.as_deref())
        .await?;
    Ok(Json(page))
}
