//! Novel and chapter writes: author/category resolution, slugs, approval and
//! follower notifications.

use booknest_core::slug::{slugify, unique_slug};
use booknest_core::store::is_slug_variant;
use booknest_core::{
    validate_title, Author, BookNestError, Category, Chap, Novel, NovelCard, NovelDraft,
    NovelStatus, Notification, Result, Store,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::tags::resolve_tags;
use crate::auth::AuthUser;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNovelRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// An author id, or a name to look up or create.
    pub author: String,
    /// Category id or slug.
    pub category: String,
    #[serde(default)]
    pub status: Option<NovelStatus>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NovelPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub status: Option<NovelStatus>,
    pub tags: Option<Vec<String>>,
    pub likes: Option<u64>,
    /// Admin only.
    pub modvote: Option<bool>,
    /// Admin only.
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChapRequest {
    pub novel: String,
    pub title: String,
    pub content: String,
}

/// Finds the author by id, then by name slug, and creates it when neither matches.
pub async fn resolve_author(store: &dyn Store, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BookNestError::validation("author is required"));
    }
    if let Some(author) = store.author_by_id(raw).await? {
        return Ok(author.id);
    }
    let base = slugify(raw);
    if !base.is_empty() {
        if let Some(author) = store.author_by_slug(&base).await? {
            return Ok(author.id);
        }
    }

    let mut author = Author::new(raw)?;
    if base.is_empty() {
        author.slug = "tac-gia".to_string();
    }
    let taken = store.author_slugs_like(&author.slug).await?;
    author.slug = unique_slug(&author.slug, |candidate| taken.iter().any(|t| t == candidate));
    store.insert_author(author.clone()).await?;
    info!(author = %author.slug, "Created author");
    Ok(author.id)
}

pub async fn resolve_category(store: &dyn Store, raw: &str) -> Result<Category> {
    let raw = raw.trim();
    if let Some(category) = store.category_by_id(raw).await? {
        return Ok(category);
    }
    store
        .category_by_slug(raw)
        .await?
        .ok_or_else(|| BookNestError::validation(format!("category '{}' does not exist", raw)))
}

/// Slug for `title`, suffixed with `-N` when taken. A novel that already owns
/// a variant of the base slug keeps it.
pub async fn novel_slug(store: &dyn Store, title: &str, current: Option<&str>) -> Result<String> {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "truyen".to_string();
    }
    if let Some(current) = current.filter(|c| is_slug_variant(&base, c)) {
        return Ok(current.to_string());
    }
    let taken = store.novel_slugs_like(&base).await?;
    Ok(unique_slug(&base, |candidate| taken.iter().any(|t| t == candidate)))
}

async fn card(store: &dyn Store, id: &str) -> Result<NovelCard> {
    store
        .novel_card(id)
        .await?
        .ok_or_else(|| BookNestError::not_found("Novel"))
}

/// Admin status as stored, not as the token claims it.
async fn is_current_admin(store: &dyn Store, caller: &AuthUser) -> Result<bool> {
    Ok(store
        .user_by_id(&caller.id)
        .await?
        .is_some_and(|user| user.is_admin()))
}

pub async fn create_novel(
    store: &dyn Store,
    caller: &AuthUser,
    req: CreateNovelRequest,
) -> Result<NovelCard> {
    validate_title(&req.title)?;
    let category = resolve_category(store, &req.category).await?;
    let author = resolve_author(store, &req.author).await?;
    let tags = match &req.tags {
        Some(names) => resolve_tags(store, names).await?,
        None => Vec::new(),
    };
    let slug = novel_slug(store, &req.title, None).await?;
    let approved = is_current_admin(store, caller).await?;

    let novel = Novel::from_draft(NovelDraft {
        title: req.title,
        slug,
        description: req.description,
        image: req.image,
        author,
        category: category.id,
        poster: caller.id.clone(),
        tags,
        status: req.status.unwrap_or_default(),
        approved,
    })?;
    store.insert_novel(novel.clone()).await?;
    info!(
        novel = %novel.slug,
        user_id = %caller.id,
        approved = novel.approved,
        "Novel created"
    );
    card(store, &novel.id).await
}

/// Partial update by the poster or an admin.
pub async fn update_novel(
    store: &dyn Store,
    caller: &AuthUser,
    id: &str,
    patch: NovelPatch,
) -> Result<NovelCard> {
    let mut novel = store
        .novel_by_id(id)
        .await?
        .ok_or_else(|| BookNestError::not_found("Novel"))?;
    let admin = is_current_admin(store, caller).await?;
    if novel.poster != caller.id && !admin {
        return Err(BookNestError::Forbidden(
            "Only the poster or an admin can edit this novel".to_string(),
        ));
    }

    if let Some(title) = patch.title {
        validate_title(&title)?;
        let title = title.trim().to_string();
        if title != novel.title {
            novel.slug = novel_slug(store, &title, Some(&novel.slug)).await?;
            novel.title = title;
        }
    }
    if let Some(description) = patch.description {
        novel.description = description;
    }
    if let Some(image) = patch.image.filter(|i| !i.trim().is_empty()) {
        novel.image = image;
    }
    if let Some(author) = patch.author {
        novel.author = resolve_author(store, &author).await?;
    }
    if let Some(category) = patch.category {
        novel.category = resolve_category(store, &category).await?.id;
    }
    if let Some(status) = patch.status {
        novel.status = status;
    }
    if let Some(names) = patch.tags {
        novel.tags = resolve_tags(store, &names).await?;
    }
    if let Some(likes) = patch.likes {
        novel.likes = likes;
    }
    if admin {
        if let Some(modvote) = patch.modvote {
            novel.modvote = modvote;
        }
        if let Some(approved) = patch.approved {
            novel.approved = approved;
        }
    }
    novel.updated_at = booknest_core::time::now();

    store.update_novel(&novel).await?;
    debug!(novel = %novel.slug, "Novel updated");
    card(store, &novel.id).await
}

/// Stores the next chapter and tells every follower except the poster.
pub async fn post_chapter(store: &dyn Store, caller: &AuthUser, req: NewChapRequest) -> Result<Chap> {
    let novel = store
        .novel_by_id(&req.novel)
        .await?
        .ok_or_else(|| BookNestError::not_found("Novel"))?;
    if novel.poster != caller.id && !is_current_admin(store, caller).await? {
        return Err(BookNestError::Forbidden(
            "Only the poster or an admin can add chapters".to_string(),
        ));
    }

    let chap = Chap::new(&novel.id, &caller.id, &req.title, &req.content)?;
    let chap = store.insert_chap(chap).await?;

    let notis: Vec<Notification> = store
        .follower_ids(&novel.id)
        .await?
        .into_iter()
        .filter(|follower| *follower != caller.id)
        .map(|follower| Notification::new_chapter(&follower, &novel.id, &novel.slug, chap.chap))
        .collect();
    let notified = notis.len();
    if !notis.is_empty() {
        store.insert_notifications(notis).await?;
    }
    info!(novel = %novel.slug, chap = chap.chap, notified, "Chapter posted");
    Ok(chap)
}
