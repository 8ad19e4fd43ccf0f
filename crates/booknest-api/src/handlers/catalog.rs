//! Categories and authors.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use booknest_core::slug::{slugify, unique_slug};
use booknest_core::time::Timestamp;
use booknest_core::{Author, AuthorView, Category, CategoryView, DEFAULT_CATEGORY_SLUG};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::auth::{AdminUser, AuthUser};
use crate::{ApiError, ApiResult, AppState, JsonBody};

pub const AUTHOR_SEARCH_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub cate: String,
    #[serde(default)]
    pub e_cate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryPatch {
    pub cate: Option<String>,
    pub e_cate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOption {
    Reassign,
    DeleteNovels,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub option: Option<String>,
}

impl DeleteParams {
    fn option(&self) -> ApiResult<Option<DeleteOption>> {
        match self.option.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some("reassign") => Ok(Some(DeleteOption::Reassign)),
            Some("delete_novels") => Ok(Some(DeleteOption::DeleteNovels)),
            Some(other) => Err(ApiError::bad_request(format!(
                "option must be reassign or delete_novels (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorRequest {
    pub name: String,
    #[serde(default)]
    pub birth: Option<String>,
    #[serde(default)]
    pub des: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryView>>> {
    Ok(Json(state.store.list_categories().await?))
}

pub async fn category_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Category>> {
    state
        .store
        .category_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Category"))
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(req): JsonBody<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = Category::new(&req.cate, req.e_cate.as_deref())?;
    state.store.insert_category(category.clone()).await?;
    info!(category = %category.slug, admin = %admin.username, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<CategoryPatch>,
) -> ApiResult<Json<Category>> {
    let mut category = state
        .store
        .category_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    if !category.editable {
        return Err(ApiError::forbidden("This category cannot be edited"));
    }

    let renamed = Category::new(
        patch.cate.as_deref().unwrap_or(&category.cate),
        Some(patch.e_cate.as_deref().unwrap_or(&category.e_cate)),
    )?;
    category.slug = renamed.slug;
    category.cate = renamed.cate;
    category.e_cate = renamed.e_cate;

    state.store.update_category(&category).await?;
    info!(category = %category.slug, admin = %admin.username, "Category updated");
    Ok(Json(category))
}

/// Returns the fallback category, recreating it if it went missing.
async fn fallback_category(state: &AppState) -> ApiResult<Category> {
    if let Some(category) = state.store.category_by_slug(DEFAULT_CATEGORY_SLUG).await? {
        return Ok(category);
    }
    warn!("Fallback category missing, recreating it");
    let category = Category::fallback();
    state.store.insert_category(category.clone()).await?;
    Ok(category)
}

pub async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<JsonValue>> {
    let option = params.option()?;
    let category = state
        .store
        .category_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    if !category.editable {
        return Err(ApiError::forbidden("Cannot delete this default category"));
    }

    let novel_count = state.store.count_category_novels(&category.id).await?;
    if novel_count > 0 {
        match option {
            None => {
                return Ok(Json(json!({
                    "requireOption": true,
                    "novelCount": novel_count
                })))
            }
            Some(DeleteOption::Reassign) => {
                let fallback = fallback_category(&state).await?;
                let moved = state.store.reassign_novels(&category.id, &fallback.id).await?;
                info!(category = %category.slug, moved, "Novels moved to the fallback category");
            }
            Some(DeleteOption::DeleteNovels) => {
                let removed = state.store.delete_novels_in_category(&category.id).await?;
                info!(category = %category.slug, removed, "Novels deleted with their category");
            }
        }
    }

    state.store.delete_category(&category.id).await?;
    info!(category = %category.slug, admin = %admin.username, "Category deleted");
    Ok(Json(json!({ "success": true, "removed": category })))
}

pub async fn search_authors(
    State(state): State<AppState>,
    Path(text): Path<String>,
) -> ApiResult<Json<Vec<Author>>> {
    Ok(Json(
        state.store.search_authors(&text, AUTHOR_SEARCH_LIMIT).await?,
    ))
}

pub async fn author_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<AuthorView>> {
    let author = state
        .store
        .author_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Author"))?;
    let novel_count = state.store.count_author_novels(&author.id).await?;
    Ok(Json(AuthorView {
        author,
        novel_count,
    }))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
fn parse_birth(raw: &str) -> ApiResult<Timestamp> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("invalid birth date '{}'", raw)))
}

pub async fn create_author(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<AuthorRequest>,
) -> ApiResult<(StatusCode, Json<Author>)> {
    let mut author = Author::new(&req.name)?;
    if let Some(birth) = req.birth.as_deref().filter(|b| !b.trim().is_empty()) {
        author.birth = Some(parse_birth(birth)?);
    }
    if let Some(des) = req.des.filter(|d| !d.trim().is_empty()) {
        author.des = des;
    }
    if let Some(image) = req.image.filter(|i| !i.trim().is_empty()) {
        author.image = image;
    }

    let mut base = slugify(&author.name);
    if base.is_empty() {
        base = "tac-gia".to_string();
    }
    let taken = state.store.author_slugs_like(&base).await?;
    author.slug = unique_slug(&base, |candidate| taken.iter().any(|t| t == candidate));

    state.store.insert_author(author.clone()).await?;
    info!(author = %author.slug, user_id = %caller.id, "Author created");
    Ok((StatusCode::CREATED, Json(author)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_options_parse() {
        let params = |v: &str| DeleteParams {
            option: Some(v.to_string()),
        };
        assert_eq!(params("reassign").option().unwrap(), Some(DeleteOption::Reassign));
        assert_eq!(
            params("delete_novels").option().unwrap(),
            Some(DeleteOption::DeleteNovels)
        );
        assert_eq!(params("").option().unwrap(), None);
        assert!(params("archive").option().is_err());
    }

    #[test]
    fn birth_dates_accept_two_shapes() {
        assert_eq!(
            parse_birth("1989-03-12").unwrap().to_rfc3339(),
            "1989-03-12T00:00:00+00:00"
        );
        assert!(parse_birth("1989-03-12T08:00:00.000Z").is_ok());
        assert!(parse_birth("12/03/1989").is_err());
    }
}
