use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use booknest_core::slug::slugify;
use booknest_core::{validate_tag_name, Tag};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::auth::AdminUser;
use crate::{ApiError, ApiResult, AppState, JsonBody};

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

async fn find_tag(state: &AppState, key: &str) -> ApiResult<Tag> {
    if let Some(tag) = state.store.tag_by_id(key).await? {
        return Ok(tag);
    }
    state
        .store
        .tag_by_slug(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.store.list_tags().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Tag>> {
    Ok(Json(find_tag(&state, &id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(req): JsonBody<TagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let tag = Tag::new(&req.name, req.description)?;
    state.store.insert_tag(tag.clone()).await?;
    info!(tag = %tag.slug, admin = %admin.username, "Tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<TagPatch>,
) -> ApiResult<Json<Tag>> {
    let mut tag = find_tag(&state, &id).await?;
    if let Some(name) = patch.name {
        let name = name.trim();
        validate_tag_name(name)?;
        tag.slug = slugify(name);
        tag.name = name.to_string();
    }
    if let Some(description) = patch.description {
        if description.chars().count() > 255 {
            return Err(ApiError::bad_request(
                "description must be at most 255 characters",
            ));
        }
        tag.description = Some(description);
    }
    tag.updated_at = booknest_core::time::now();

    state.store.update_tag(&tag).await?;
    info!(tag = %tag.slug, admin = %admin.username, "Tag updated");
    Ok(Json(tag))
}

pub async fn delete(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let tag = find_tag(&state, &id).await?;
    state.store.delete_tag(&tag.id).await?;
    info!(tag = %tag.slug, admin = %admin.username, "Tag deleted");
    Ok(Json(json!({ "success": true })))
}
