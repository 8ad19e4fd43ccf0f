use std::collections::HashSet;

use booknest_core::slug::slugify;
use booknest_core::{validate_tag_name, BookNestError, Result, Store, Tag};
use tracing::{debug, info};

/// Turns free-form tag names into tag ids, creating tags that do not exist yet.
///
/// Blank names are skipped and names sharing a slug collapse onto the first
/// occurrence, so `["Xuyên Không", "xuyen khong"]` yields a single id. The
/// returned ids follow input order.
pub async fn resolve_tags(store: &dyn Store, names: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(names.len());

    for raw in names {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        validate_tag_name(name)?;
        let slug = slugify(name);
        if !seen.insert(slug.clone()) {
            continue;
        }

        let tag = match store.tag_by_slug(&slug).await? {
            Some(tag) => tag,
            None => create_tag(store, name, &slug).await?,
        };
        ids.push(tag.id);
    }

    Ok(ids)
}

async fn create_tag(store: &dyn Store, name: &str, slug: &str) -> Result<Tag> {
    let tag = Tag::new(name, None)?;
    match store.insert_tag(tag.clone()).await {
        Ok(()) => {
            info!(tag = %tag.slug, "Created tag");
            Ok(tag)
        }
        // Someone else created it between our lookup and insert.
        Err(BookNestError::Conflict(msg)) => {
            debug!(tag = %slug, "Tag appeared concurrently, re-reading");
            store
                .tag_by_slug(slug)
                .await?
                .ok_or(BookNestError::Conflict(msg))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booknest_store::MemoryStore;

    #[tokio::test]
    async fn creates_missing_and_reuses_existing() {
        let store = MemoryStore::new();
        let existing = Tag::new("Huyền Huyễn", None).unwrap();
        store.insert_tag(existing.clone()).await.unwrap();

        let names = vec![
            " Xuyên Không ".to_string(),
            "".to_string(),
            "huyen huyen".to_string(),
            "xuyen khong".to_string(),
        ];
        let ids = resolve_tags(&store, &names).await.unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], existing.id);
        let created = store.tag_by_slug("xuyen-khong").await.unwrap().unwrap();
        assert_eq!(ids[0], created.id);
        assert_eq!(created.name, "Xuyên Không");
        assert_eq!(store.list_tags().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn overlong_names_are_rejected() {
        let store = MemoryStore::new();
        let err = resolve_tags(&store, &["x".repeat(51)]).await.unwrap_err();
        assert!(matches!(err, BookNestError::Validation(_)));
        assert!(store.list_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_input_resolves_to_nothing() {
        let store = MemoryStore::new();
        let ids = resolve_tags(&store, &["  ".to_string()]).await.unwrap();
        assert!(ids.is_empty());
    }
}
