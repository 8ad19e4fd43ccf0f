use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use booknest_core::{
    Category, Chap, ChapSummary, ChapterBucket, ListTurn, Novel, NovelCard, NovelPage,
    NovelQuery, NovelStatus, SortKey, CHAPTERS_PER_PAGE, MAX_PAGE, MAX_PER_PAGE,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::auth::{AdminUser, AuthUser, MaybeUser};
use crate::services::novels::{self as service, CreateNovelRequest, NewChapRequest, NovelPatch};
use crate::{ApiError, ApiResult, AppState, JsonBody};

pub const TURN_PAGE_SIZE: usize = 20;
pub const CATEGORY_PAGE_SIZE: usize = 15;
pub const SEARCH_LIMIT: usize = 20;

/// Listing parameters as the web client sends them. Everything arrives as a
/// string because the client sends `undefined` and empty values freely.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub stt: Option<String>,
    pub status: Option<String>,
    pub cnum: Option<String>,
    pub srt: Option<String>,
    pub search: Option<String>,
}

fn number<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}

impl ListParams {
    pub fn page(&self) -> Option<usize> {
        number(self.page.as_deref())
    }

    /// Applies the caller's filters on top of `base`.
    pub fn narrow(&self, base: NovelQuery, per_page: usize) -> NovelQuery {
        let status = NovelStatus::from_query(self.stt.as_deref())
            .or_else(|| NovelStatus::from_query(self.status.as_deref()));
        let mut query = base
            .with_status(status)
            .with_bucket(ChapterBucket::from_query(number(self.cnum.as_deref())))
            .searching(self.search.as_deref())
            .paged(self.page(), per_page);
        if let Some(sort) = SortKey::from_query(self.srt.as_deref()) {
            query = query.sorted_by(sort);
        }
        query
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParam {
    pub page: Option<String>,
}

impl PageParam {
    pub fn page(&self) -> Option<usize> {
        number(self.page.as_deref())
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterPage {
    pub chaps: Vec<ChapSummary>,
    pub total: u64,
    pub page: usize,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ChapterRead {
    #[serde(flatten)]
    pub chap: Chap,
    #[serde(rename = "novelTitle")]
    pub novel_title: String,
    #[serde(rename = "novelSlug")]
    pub novel_slug: String,
    #[serde(rename = "chapCount")]
    pub chap_count: u64,
}

/// Looks a novel up by id, then by slug.
pub(crate) async fn find_novel(state: &AppState, key: &str) -> ApiResult<Novel> {
    if let Some(novel) = state.store.novel_by_id(key).await? {
        return Ok(novel);
    }
    state
        .store
        .novel_by_slug(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Novel"))
}

/// Pending novels are visible to their poster and to admins only.
fn ensure_visible(novel: &Novel, caller: Option<&AuthUser>) -> ApiResult<()> {
    let privileged = caller.is_some_and(|c| c.is_admin() || c.id == novel.poster);
    if novel.approved || privileged {
        Ok(())
    } else {
        Err(ApiError::not_found("Novel"))
    }
}

async fn find_category(state: &AppState, key: &str) -> ApiResult<Category> {
    if let Some(category) = state.store.category_by_id(key).await? {
        return Ok(category);
    }
    state
        .store
        .category_by_slug(key)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))
}

async fn card(state: &AppState, id: &str) -> ApiResult<NovelCard> {
    state
        .store
        .novel_card(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Novel"))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<CreateNovelRequest>,
) -> ApiResult<(StatusCode, Json<NovelCard>)> {
    let card = service::create_novel(state.store.as_ref(), &caller, req).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn edit(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<NovelPatch>,
) -> ApiResult<Json<NovelCard>> {
    let card = service::update_novel(state.store.as_ref(), &caller, &id, patch).await?;
    Ok(Json(card))
}

/// Every novel the caller posted, pending ones included.
pub async fn mine(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Vec<NovelCard>>> {
    let mut novels = Vec::new();
    for page in 1..=MAX_PAGE {
        let query = NovelQuery::all()
            .posted_by(caller.id.clone())
            .paged(Some(page), MAX_PER_PAGE);
        let batch = state.store.list_novels(&query).await?;
        let last = batch.novels.len() < MAX_PER_PAGE || page as u64 >= batch.pages;
        novels.extend(batch.novels);
        if last {
            break;
        }
    }
    Ok(Json(novels))
}

/// One of the fixed home-page lists.
pub async fn fixed_list(state: AppState, turn: ListTurn, limit: usize) -> ApiResult<Json<Vec<NovelCard>>> {
    let query = turn.apply(NovelQuery::public()).limited(limit);
    Ok(Json(state.store.list_novels(&query).await?.novels))
}

pub async fn by_turn(
    State(state): State<AppState>,
    Path(turn): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<NovelPage>> {
    let turn = ListTurn::parse(&turn)?;
    // The list's own sort applies unless the caller picked one.
    let query = turn.apply(params.narrow(NovelQuery::public(), TURN_PAGE_SIZE));
    let query = match SortKey::from_query(params.srt.as_deref()) {
        Some(sort) => query.sorted_by(sort),
        None => query,
    };
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn by_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParam>,
) -> ApiResult<Json<NovelPage>> {
    let category = find_category(&state, &id).await?;
    let query = NovelQuery::public()
        .in_category(category.id)
        .paged(params.page(), CATEGORY_PAGE_SIZE);
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn completed_in_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParam>,
) -> ApiResult<Json<NovelPage>> {
    let category = find_category(&state, &id).await?;
    let query = NovelQuery::public()
        .in_category(category.id)
        .with_status(Some(NovelStatus::Completed))
        .paged(params.page(), CATEGORY_PAGE_SIZE);
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn most_viewed_in_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParam>,
) -> ApiResult<Json<NovelPage>> {
    let category = find_category(&state, &id).await?;
    let query = NovelQuery::public()
        .in_category(category.id)
        .sorted_by(SortKey::Views)
        .paged(params.page(), CATEGORY_PAGE_SIZE);
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn filter_in_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<NovelPage>> {
    let category = find_category(&state, &id).await?;
    let query = params.narrow(NovelQuery::public().in_category(category.id), TURN_PAGE_SIZE);
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn by_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<NovelCard>>> {
    let author = match state.store.author_by_id(&id).await? {
        Some(author) => author,
        None => state
            .store
            .author_by_slug(&id)
            .await?
            .ok_or_else(|| ApiError::not_found("Author"))?,
    };
    let query = NovelQuery::public()
        .by_author(author.id)
        .limited(MAX_PER_PAGE);
    Ok(Json(state.store.list_novels(&query).await?.novels))
}

pub async fn search(
    State(state): State<AppState>,
    Path(text): Path<String>,
) -> ApiResult<Json<Vec<NovelCard>>> {
    let query = NovelQuery::public()
        .searching(Some(&text))
        .limited(SEARCH_LIMIT);
    Ok(Json(state.store.list_novels(&query).await?.novels))
}

pub async fn by_slug(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(key): Path<String>,
) -> ApiResult<Json<NovelCard>> {
    let novel = find_novel(&state, &key).await?;
    ensure_visible(&novel, caller.as_ref())?;
    Ok(Json(card(&state, &novel.id).await?))
}

pub async fn chapters(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(key): Path<String>,
    Query(params): Query<PageParam>,
) -> ApiResult<Json<ChapterPage>> {
    let novel = find_novel(&state, &key).await?;
    ensure_visible(&novel, caller.as_ref())?;
    let page = params.page().unwrap_or(1).clamp(1, MAX_PAGE);
    let (chaps, total) = state.store.chapter_page(&novel.id, page).await?;
    Ok(Json(ChapterPage {
        chaps,
        total,
        page,
        pages: total.div_ceil(CHAPTERS_PER_PAGE as u64),
    }))
}

pub async fn all_chapters(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(key): Path<String>,
) -> ApiResult<Json<Vec<ChapSummary>>> {
    let novel = find_novel(&state, &key).await?;
    ensure_visible(&novel, caller.as_ref())?;
    Ok(Json(state.store.all_chapters(&novel.id).await?))
}

/// Reading a chapter counts as a view of its novel.
pub async fn read_chapter(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path((key, number)): Path<(String, u32)>,
) -> ApiResult<Json<ChapterRead>> {
    let novel = find_novel(&state, &key).await?;
    ensure_visible(&novel, caller.as_ref())?;
    let chap = state
        .store
        .chap_by_number(&novel.id, number)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter"))?;
    state.store.increment_views(&novel.id).await?;
    let chap_count = card(&state, &novel.id).await?.stats.chap_count;

    Ok(Json(ChapterRead {
        chap,
        novel_title: novel.title,
        novel_slug: novel.slug,
        chap_count,
    }))
}

pub async fn new_chapter(
    State(state): State<AppState>,
    caller: AuthUser,
    JsonBody(req): JsonBody<NewChapRequest>,
) -> ApiResult<(StatusCode, Json<Chap>)> {
    let chap = service::post_chapter(state.store.as_ref(), &caller, req).await?;
    Ok((StatusCode::CREATED, Json(chap)))
}

pub async fn pending(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<PageParam>,
) -> ApiResult<Json<NovelPage>> {
    let query = NovelQuery::all()
        .approved(Some(false))
        .sorted_by(SortKey::Created)
        .paged(params.page(), TURN_PAGE_SIZE);
    Ok(Json(state.store.list_novels(&query).await?))
}

pub async fn approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<NovelCard>> {
    let mut novel = find_novel(&state, &id).await?;
    novel.approved = true;
    state.store.update_novel(&novel).await?;
    info!(novel = %novel.slug, admin = %admin.username, "Novel approved");
    Ok(Json(card(&state, &novel.id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let novel = find_novel(&state, &id).await?;
    state.store.delete_novel(&novel.id).await?;
    info!(novel = %novel.slug, admin = %admin.username, "Novel rejected");
    Ok(Json(json!({ "success": true })))
}

pub async fn toggle_modvote(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<NovelCard>> {
    let mut novel = find_novel(&state, &id).await?;
    novel.modvote = !novel.modvote;
    state.store.update_novel(&novel).await?;
    info!(novel = %novel.slug, modvote = novel.modvote, admin = %admin.username, "Editor pick toggled");
    Ok(Json(card(&state, &novel.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_tolerate_client_noise() {
        let params = ListParams {
            page: Some("undefined".into()),
            stt: Some("".into()),
            status: Some("completed".into()),
            cnum: Some("2".into()),
            srt: Some("view".into()),
            search: Some("  ".into()),
        };
        let query = params.narrow(NovelQuery::public(), TURN_PAGE_SIZE);
        assert_eq!(query.page, 1);
        assert_eq!(query.status, Some(NovelStatus::Completed));
        assert_eq!(query.bucket, ChapterBucket::From100To500);
        assert_eq!(query.sort, SortKey::Views);
        assert!(query.search.is_none());
        assert_eq!(query.per_page, TURN_PAGE_SIZE);
    }

    #[test]
    fn turn_keeps_its_own_filter_over_caller_status() {
        let params = ListParams {
            stt: Some("drop".into()),
            ..Default::default()
        };
        let turn = ListTurn::Completed;
        let query = turn.apply(params.narrow(NovelQuery::public(), TURN_PAGE_SIZE));
        assert_eq!(query.status, Some(NovelStatus::Completed));
    }
}
