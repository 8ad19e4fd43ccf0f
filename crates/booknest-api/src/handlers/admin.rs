//! Administration. Every handler here requires [`AdminUser`].

use axum::{
    extract::{Path, Query, State},
    Json,
};
use booknest_core::{
    CommentView, NovelCard, NovelPage, NovelQuery, NovelStatus, PublicUser, Role, SortKey,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use super::novels::find_novel;
use crate::auth::{AdminUser, AuthUser};
use crate::services::novels::{self as novel_service, NovelPatch};
use crate::{ApiError, ApiResult, AppState, JsonBody};

#[derive(Debug, Serialize)]
pub struct Stats {
    #[serde(rename = "userCount")]
    pub user_count: u64,
    #[serde(rename = "novelCount")]
    pub novel_count: u64,
    #[serde(rename = "pendingCount")]
    pub pending_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminNovelParams {
    pub title: Option<String>,
    #[serde(rename = "categoryId")]
    pub category_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Treats empty strings and the client's literal `undefined` as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "undefined")
}

impl AdminNovelParams {
    pub fn query(&self) -> NovelQuery {
        let mut query = NovelQuery::all()
            .searching(present(&self.title))
            .with_status(NovelStatus::from_query(present(&self.status)))
            .sorted_by(SortKey::Created)
            .paged(
                present(&self.page).and_then(|p| p.parse().ok()),
                present(&self.limit)
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(20),
            );
        if let Some(category) = present(&self.category_id) {
            query = query.in_category(category);
        }
        query
    }
}

pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<Stats>> {
    let (user_count, novel_count, pending_count) = tokio::try_join!(
        state.store.count_users(),
        state.store.count_novels(None),
        state.store.count_novels(Some(false)),
    )?;
    Ok(Json(Stats {
        user_count,
        novel_count,
        pending_count,
    }))
}

pub async fn users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<PublicUser>>> {
    let users = state.store.list_users().await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleRequest>,
) -> ApiResult<Json<PublicUser>> {
    let role = Role::parse(req.role.trim())?;
    let mut user = state
        .store
        .user_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if user.id == admin.id && role != Role::Admin {
        return Err(ApiError::bad_request("Admins cannot demote themselves"));
    }
    user.role = role;
    user.updated_at = booknest_core::time::now();
    state.store.update_user(&user).await?;
    info!(user_id = %user.id, role = role.as_str(), admin = %admin.username, "Role changed");
    Ok(Json(PublicUser::from(&user)))
}

pub async fn novels(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<AdminNovelParams>,
) -> ApiResult<Json<NovelPage>> {
    Ok(Json(state.store.list_novels(&params.query()).await?))
}

pub async fn update_novel(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<NovelPatch>,
) -> ApiResult<Json<NovelCard>> {
    let caller = AuthUser {
        id: admin.id.clone(),
        username: admin.username.clone(),
        role: admin.role,
    };
    let card = novel_service::update_novel(state.store.as_ref(), &caller, &id, patch).await?;
    Ok(Json(card))
}

pub async fn delete_novel(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let novel = find_novel(&state, &id).await?;
    state.store.delete_novel(&novel.id).await?;
    info!(novel = %novel.slug, admin = %admin.username, "Novel deleted");
    Ok(Json(json!({ "success": true })))
}

pub async fn pending_comments(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.store.pending_comments().await?))
}

pub async fn approve_comment(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let comment = state.store.approve_comment(&id).await?;
    info!(comment = %comment.id, admin = %admin.username, "Comment approved");
    Ok(Json(json!({ "success": true, "comment": comment })))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let removed = state.store.delete_comment(&id).await?;
    info!(comment = %id, removed, admin = %admin.username, "Comment deleted");
    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_params_ignore_placeholders() {
        let params = AdminNovelParams {
            title: Some("  ".into()),
            category_id: Some("undefined".into()),
            status: Some("drop".into()),
            page: Some("3".into()),
            limit: Some("5".into()),
        };
        let query = params.query();
        assert!(query.category.is_none());
        assert!(query.search.is_none());
        assert_eq!(query.status, Some(NovelStatus::Drop));
        assert_eq!((query.page, query.per_page), (3, 5));
        assert_eq!(query.approved, None);
        assert_eq!(query.sort, SortKey::Created);
    }
}
