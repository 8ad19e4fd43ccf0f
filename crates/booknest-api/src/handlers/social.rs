//! Follows, ratings and comments.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use booknest_core::{
    BookNestError, Comment, CommentView, Follow, FollowView, Rating, RatingView, UserBrief,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use super::novels::find_novel;
use crate::auth::AuthUser;
use crate::services::settings;
use crate::{ApiError, ApiResult, AppState, JsonBody};

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub novel: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub novel: String,
    pub scores: u8,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub novel: String,
    pub content: String,
    #[serde(default)]
    pub parent: Option<String>,
}

async fn follow_novel(state: &AppState, caller: &AuthUser, key: &str) -> ApiResult<Json<JsonValue>> {
    let novel = find_novel(state, key).await?;
    let follow = state
        .store
        .insert_follow(Follow::new(&novel.id, &caller.id))
        .await?;
    debug!(user_id = %caller.id, novel = %novel.slug, follow = %follow.id, "Followed");
    Ok(Json(json!({ "success": true })))
}

pub async fn follow(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<FollowRequest>,
) -> ApiResult<Json<JsonValue>> {
    follow_novel(&state, &caller, &req.novel).await
}

pub async fn follow_by_path(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    follow_novel(&state, &caller, &id).await
}

pub async fn unfollow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let removed = state.store.delete_follow(&id, &caller.id).await?;
    debug!(user_id = %caller.id, novel = %id, removed, "Unfollowed");
    Ok(Json(json!({ "success": true })))
}

pub async fn check_follow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let followed = state.store.follow_exists(&id, &caller.id).await?;
    Ok(Json(json!({ "followed": followed })))
}

pub async fn my_follows(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<FollowView>>> {
    Ok(Json(state.store.followed_novels(&caller.id).await?))
}

pub async fn rate(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<RatingRequest>,
) -> ApiResult<Json<JsonValue>> {
    let novel = find_novel(&state, &req.novel).await?;
    let rating = Rating::new(&caller.id, &novel.id, req.scores, req.content)?;
    let novel = match state.store.insert_rating(rating).await {
        Ok(novel) => novel,
        // Rating twice is a bad request.
        Err(BookNestError::Conflict(msg)) => return Err(ApiError::BadRequest(msg)),
        Err(e) => return Err(e.into()),
    };
    info!(user_id = %caller.id, novel = %novel.slug, scores = req.scores, "Novel rated");
    Ok(Json(json!({
        "success": true,
        "scores": novel.scores,
        "rate_nums": novel.rate_nums
    })))
}

pub async fn check_rated(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let rated = state.store.rating_exists(&id, &caller.id).await?;
    Ok(Json(json!({ "rated": rated })))
}

pub async fn novel_ratings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RatingView>>> {
    Ok(Json(state.store.ratings_for_novel(&id).await?))
}

pub async fn comment(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let site = settings::current(state.store.as_ref()).await?;
    if !site.comment_enabled {
        return Err(ApiError::forbidden("Comments are disabled"));
    }
    let novel = find_novel(&state, &req.novel).await?;

    let parent = match req.parent.filter(|p| !p.trim().is_empty()) {
        Some(parent_id) => {
            let parent = state
                .store
                .comment_by_id(&parent_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Parent comment"))?;
            if parent.novel != novel.id {
                return Err(ApiError::bad_request(
                    "Parent comment belongs to another novel",
                ));
            }
            Some(parent.id)
        }
        None => None,
    };

    let author = state.store.user_by_id(&caller.id).await?;
    let approved = !site.comment_pre_approval || author.as_ref().is_some_and(|u| u.is_admin());
    let comment = Comment::new(&caller.id, &novel.id, parent, &req.content, approved)?;
    state.store.insert_comment(comment.clone()).await?;
    info!(
        user_id = %caller.id,
        novel = %novel.slug,
        approved,
        "Comment posted"
    );

    Ok((
        StatusCode::CREATED,
        Json(CommentView::assemble(&comment, author.as_ref().map(UserBrief::from), 0)),
    ))
}

pub async fn novel_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.store.root_comments(&id).await?))
}

pub async fn replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.store.replies(&id).await?))
}
