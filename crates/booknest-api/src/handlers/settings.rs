use axum::{extract::State, Json};
use booknest_core::{SettingsPatch, SiteSettings};
use tracing::info;

use crate::auth::AdminUser;
use crate::services::settings;
use crate::{ApiResult, AppState, JsonBody};

pub async fn get(State(state): State<AppState>) -> ApiResult<Json<SiteSettings>> {
    Ok(Json(settings::current(state.store.as_ref()).await?))
}

/// Merges the given fields into the stored settings.
pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(patch): JsonBody<SettingsPatch>,
) -> ApiResult<Json<SiteSettings>> {
    let mut current = settings::current(state.store.as_ref()).await?;
    current.apply(patch)?;
    state.store.save_settings(&current).await?;
    info!(admin = %admin.username, "Site settings updated");
    Ok(Json(current))
}
