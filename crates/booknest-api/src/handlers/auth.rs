use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use booknest_core::{
    validate_password, NotificationFeed, PublicUser, User, UserProfile, Vote, VoteView,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::{ApiError, ApiResult, AppState, JsonBody};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub image: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "currentPassword")]
    pub current_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadNotisRequest {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub novel: String,
    pub goldcard: u32,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoteReceipt {
    #[serde(flatten)]
    pub vote: Vote,
    /// The voter's balance after the vote.
    pub remaining: u32,
}

async fn current_user(state: &AppState, caller: &AuthUser) -> ApiResult<User> {
    state
        .store
        .user_by_id(&caller.id)
        .await?
        .ok_or_else(ApiError::unauthorized)
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    state
        .login_limiter
        .check(&format!("register:{}", req.username.trim()))?;
    validate_password(&req.password)?;

    let hash = hash_password(&req.password)?;
    let user = User::new(&req.username, &req.email, hash)?;
    state.store.insert_user(user.clone()).await?;
    info!(user_id = %user.id, username = %user.username, "User registered");

    let access_token = state.tokens.issue(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let username = req.username.trim();
    state.login_limiter.check(username)?;

    let user = state.store.user_by_username(username).await?;
    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password)) else {
        warn!(username = %username, "Failed login");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    };

    info!(user_id = %user.id, "User logged in");
    let access_token = state.tokens.issue(&user)?;
    Ok(Json(AuthResponse {
        access_token,
        user: PublicUser::from(&user),
    }))
}

pub async fn me(State(state): State<AppState>, caller: AuthUser) -> ApiResult<Json<UserProfile>> {
    let user = current_user(&state, &caller).await?;
    let stats = state.store.user_stats(&user.id).await?;
    Ok(Json(UserProfile {
        user: PublicUser::from(&user),
        stats,
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<ProfileUpdate>,
) -> ApiResult<Json<PublicUser>> {
    let mut user = current_user(&state, &caller).await?;

    if let Some(image) = req.image.filter(|i| !i.trim().is_empty()) {
        user.image = image;
    }
    if let Some(password) = req.password {
        let current = req.current_password.unwrap_or_default();
        if !verify_password(&current, &user.password) {
            return Err(ApiError::bad_request("Current password is incorrect"));
        }
        validate_password(&password)?;
        user.password = hash_password(&password)?;
    }
    user.updated_at = booknest_core::time::now();

    state.store.update_user(&user).await?;
    info!(user_id = %user.id, "Profile updated");
    Ok(Json(PublicUser::from(&user)))
}

pub async fn notifications(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<NotificationFeed>> {
    Ok(Json(state.store.notification_feed(&caller.id).await?))
}

/// Marks the listed notifications read, or all of them when no ids are sent.
pub async fn read_notifications(
    State(state): State<AppState>,
    caller: AuthUser,
    body: Bytes,
) -> ApiResult<Json<JsonValue>> {
    let req: ReadNotisRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReadNotisRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    let updated = match req.ids {
        Some(ids) if !ids.is_empty() => state.store.mark_read(&caller.id, &ids).await?,
        _ => state.store.mark_all_read(&caller.id).await?,
    };
    Ok(Json(json!({ "success": true, "updated": updated })))
}

pub async fn vote(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<VoteRequest>,
) -> ApiResult<(StatusCode, Json<VoteReceipt>)> {
    if state.store.novel_by_id(&req.novel).await?.is_none() {
        return Err(ApiError::not_found("Novel"));
    }
    let vote = Vote::new(&req.novel, &caller.id, req.goldcard, req.content)?;
    let remaining = state.store.insert_vote(vote.clone()).await?;
    info!(
        user_id = %caller.id,
        novel = %vote.novel,
        goldcard = vote.goldcard,
        "Vote cast"
    );
    Ok((StatusCode::CREATED, Json(VoteReceipt { vote, remaining })))
}

pub async fn my_votes(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<VoteView>>> {
    Ok(Json(state.store.votes_by_user(&caller.id).await?))
}
