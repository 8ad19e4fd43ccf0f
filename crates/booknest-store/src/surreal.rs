//! SurrealDB-backed store.
//!
//! Documents are stored schemaless with their own `_id` field next to the
//! record id, so every read is `SELECT * OMIT id` and decodes straight into
//! the core models. Multi-document writes run inside one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use booknest_core::config::SurrealDbConfig;
use booknest_core::listing::{page_offset, NovelPage, NovelQuery, SortKey};
use booknest_core::models::*;
use booknest_core::store::{is_slug_variant, Store};
use booknest_core::time::{format_timestamp, now};
use booknest_core::{BookNestError, Result};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use surrealdb::{engine::any::Any, opt::auth::Root, Response, Surreal};
use tracing::{debug, info};

type Binds = Vec<(&'static str, JsonValue)>;

const SETTINGS_RECORD: &str = "settings:site";
const THROWN_NOT_FOUND: &str = "booknest:not_found:";
const THROWN_CONFLICT: &str = "booknest:conflict:";
const THROWN_INSUFFICIENT: &str = "booknest:insufficient";

const SCHEMA: &str = r#"
    DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS users_id ON TABLE users COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS users_username ON TABLE users COLUMNS username UNIQUE;
    DEFINE INDEX IF NOT EXISTS users_email ON TABLE users COLUMNS email UNIQUE;

    DEFINE TABLE IF NOT EXISTS authors SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS authors_id ON TABLE authors COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS authors_slug ON TABLE authors COLUMNS slug UNIQUE;

    DEFINE TABLE IF NOT EXISTS categories SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS categories_id ON TABLE categories COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS categories_slug ON TABLE categories COLUMNS slug UNIQUE;

    DEFINE TABLE IF NOT EXISTS tags SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS tags_id ON TABLE tags COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS tags_slug ON TABLE tags COLUMNS slug UNIQUE;

    DEFINE TABLE IF NOT EXISTS novels SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS novels_id ON TABLE novels COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS novels_slug ON TABLE novels COLUMNS slug UNIQUE;
    DEFINE INDEX IF NOT EXISTS novels_category ON TABLE novels COLUMNS category;
    DEFINE INDEX IF NOT EXISTS novels_author ON TABLE novels COLUMNS author;

    DEFINE TABLE IF NOT EXISTS chaps SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS chaps_id ON TABLE chaps COLUMNS `_id` UNIQUE;
    DEFINE INDEX IF NOT EXISTS chaps_number ON TABLE chaps COLUMNS novel, chap UNIQUE;

    DEFINE TABLE IF NOT EXISTS follows SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS follows_pair ON TABLE follows COLUMNS novel, follower UNIQUE;

    DEFINE TABLE IF NOT EXISTS ratings SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS ratings_pair ON TABLE ratings COLUMNS novel, rater UNIQUE;

    DEFINE TABLE IF NOT EXISTS votes SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS votes_voter ON TABLE votes COLUMNS voter;

    DEFINE TABLE IF NOT EXISTS comments SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS comments_novel ON TABLE comments COLUMNS novel;
    DEFINE INDEX IF NOT EXISTS comments_parent ON TABLE comments COLUMNS parent;

    DEFINE TABLE IF NOT EXISTS messages SCHEMALESS;
    DEFINE TABLE IF NOT EXISTS notifications SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS notifications_user ON TABLE notifications COLUMNS user;

    DEFINE TABLE IF NOT EXISTS settings SCHEMALESS;
"#;

/// Novels joined with their chapter, follow and vote aggregates.
const CARD_SOURCE: &str = "(SELECT *, \
     count((SELECT `_id` FROM chaps WHERE novel = $parent.`_id`)) AS chapCount, \
     count((SELECT `_id` FROM follows WHERE novel = $parent.`_id`)) AS followCount, \
     math::sum((SELECT VALUE goldcard FROM votes WHERE novel = $parent.`_id`)) AS voteCount, \
     string::lowercase(title) AS title_key \
     FROM novels)";

#[derive(Deserialize)]
struct NovelRow {
    #[serde(flatten)]
    novel: Novel,
    #[serde(flatten)]
    stats: NovelStats,
}

#[derive(Deserialize)]
struct CommentRow {
    #[serde(flatten)]
    comment: Comment,
    #[serde(rename = "repCount", default)]
    rep_count: u64,
}

#[derive(Deserialize)]
struct CategoryRow {
    #[serde(flatten)]
    category: Category,
    #[serde(rename = "novelCount", default)]
    novel_count: u64,
}

/// A listing query rendered to SurrealQL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedListing {
    pub conditions: Vec<String>,
    pub order: String,
    pub binds: Binds,
}

impl RenderedListing {
    pub fn render(query: &NovelQuery) -> Self {
        let mut conditions = Vec::new();
        let mut binds: Binds = Vec::new();

        if let Some(category) = &query.category {
            conditions.push("category = $category".to_string());
            binds.push(("category", json!(category)));
        }
        if let Some(author) = &query.author {
            conditions.push("author = $author".to_string());
            binds.push(("author", json!(author)));
        }
        if let Some(poster) = &query.poster {
            conditions.push("poster = $poster".to_string());
            binds.push(("poster", json!(poster)));
        }
        if let Some(status) = query.status {
            conditions.push("status = $status".to_string());
            binds.push(("status", json!(status.as_str())));
        }
        if let Some(approved) = query.approved {
            conditions.push("approved = $approved".to_string());
            binds.push(("approved", json!(approved)));
        }
        if query.modvote {
            conditions.push("modvote = true".to_string());
        }
        if query.has_chapters {
            conditions.push("chapCount > 0".to_string());
        }
        let (lo, hi) = query.bucket.bounds();
        if let Some(lo) = lo {
            conditions.push("chapCount >= $chap_min".to_string());
            binds.push(("chap_min", json!(lo)));
        }
        if let Some(hi) = hi {
            conditions.push("chapCount <= $chap_max".to_string());
            binds.push(("chap_max", json!(hi)));
        }
        if let Some(search) = &query.search {
            binds.push(("search", json!(search.lowered())));
            if search.slug().is_empty() {
                conditions.push("string::contains(title_key, $search)".to_string());
            } else {
                conditions.push(
                    "(string::contains(title_key, $search) OR string::contains(slug, $search_slug))"
                        .to_string(),
                );
                binds.push(("search_slug", json!(search.slug())));
            }
        }

        Self {
            conditions,
            order: order_clause(query.sort),
            binds,
        }
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn page_sql(&self) -> String {
        format!(
            "SELECT * OMIT id FROM {}{} ORDER BY {} LIMIT $limit START $start",
            CARD_SOURCE,
            self.where_clause(),
            self.order
        )
    }

    pub fn count_sql(&self) -> String {
        format!(
            "SELECT count() AS total FROM {}{} GROUP ALL",
            CARD_SOURCE,
            self.where_clause()
        )
    }
}

fn order_clause(sort: SortKey) -> String {
    let primary = match sort {
        SortKey::Created => Some("createdAt DESC"),
        SortKey::Updated => None,
        SortKey::Views => Some("views DESC"),
        SortKey::Likes => Some("likes DESC"),
        SortKey::Follows => Some("followCount DESC"),
        SortKey::Rating => Some("scores DESC, rate_nums DESC"),
        SortKey::Votes => Some("voteCount DESC"),
        SortKey::Chapters => Some("chapCount DESC"),
        SortKey::Title => Some("title_key ASC"),
    };
    let tail = "updatedAt DESC, `_id` ASC";
    match primary {
        Some(primary) => format!("{}, {}", primary, tail),
        None => tail.to_string(),
    }
}

/// Maps database errors, including the markers thrown by our own transactions.
fn classify_errors<I: IntoIterator<Item = String>>(messages: I) -> BookNestError {
    let messages: Vec<String> = messages.into_iter().collect();
    for msg in &messages {
        if let Some(idx) = msg.find(THROWN_NOT_FOUND) {
            let what = msg[idx + THROWN_NOT_FOUND.len()..]
                .trim_end_matches(|c: char| c == '\'' || c == '"' || c == '`')
                .to_string();
            return BookNestError::NotFound(what);
        }
        if let Some(idx) = msg.find(THROWN_CONFLICT) {
            let what = msg[idx + THROWN_CONFLICT.len()..]
                .trim_end_matches(|c: char| c == '\'' || c == '"' || c == '`')
                .to_string();
            return BookNestError::Conflict(what);
        }
        if msg.contains(THROWN_INSUFFICIENT) {
            return BookNestError::InsufficientBalance;
        }
        if msg.contains("already contains") {
            return BookNestError::conflict("Document already exists");
        }
    }
    let first = messages
        .into_iter()
        .find(|m| !m.contains("not executed due to a failed transaction"))
        .unwrap_or_else(|| "transaction failed".to_string());
    BookNestError::Database(first)
}

fn db_err(e: surrealdb::Error) -> BookNestError {
    classify_errors([e.to_string()])
}

fn decode<T: DeserializeOwned>(rows: Vec<JsonValue>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BookNestError::from))
        .collect()
}

fn doc<T: Serialize>(value: &T) -> Result<JsonValue> {
    Ok(serde_json::to_value(value)?)
}

fn total_of(rows: &[JsonValue]) -> u64 {
    rows.first()
        .and_then(|row| row.get("total"))
        .and_then(JsonValue::as_u64)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct SurrealStore {
    db: Arc<Surreal<Any>>,
}

impl SurrealStore {
    pub async fn connect(config: &SurrealDbConfig) -> Result<Self> {
        info!(
            "Connecting to SurrealDB at {} ({}/{})",
            config.connection, config.namespace, config.database
        );

        let db: Surreal<Any> = Surreal::init();
        db.connect(&config.connection)
            .await
            .map_err(|e| BookNestError::Database(format!("Failed to connect: {}", e)))?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username,
                password: password.expose_secret(),
            })
            .await
            .map_err(|e| BookNestError::Database(format!("Authentication failed: {}", e)))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                BookNestError::Database(format!("Failed to select namespace/database: {}", e))
            })?;

        let store = Self { db: Arc::new(db) };
        store.define_schema().await?;
        info!("SurrealDB store ready");
        Ok(store)
    }

    async fn define_schema(&self) -> Result<()> {
        self.run(SCHEMA, Vec::new()).await?;
        debug!("SurrealDB schema defined");
        Ok(())
    }

    async fn run(&self, sql: &str, binds: Binds) -> Result<Response> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let mut response = query.await.map_err(db_err)?;
        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(classify_errors(errors.into_values().map(|e| e.to_string())));
        }
        Ok(response)
    }

    async fn rows(&self, sql: &str, binds: Binds) -> Result<Vec<JsonValue>> {
        let mut response = self.run(sql, binds).await?;
        response.take::<Vec<JsonValue>>(0).map_err(db_err)
    }

    async fn all<T: DeserializeOwned>(&self, sql: &str, binds: Binds) -> Result<Vec<T>> {
        decode(self.rows(sql, binds).await?)
    }

    async fn first<T: DeserializeOwned>(&self, sql: &str, binds: Binds) -> Result<Option<T>> {
        Ok(self.all(sql, binds).await?.into_iter().next())
    }

    /// Value of the final statement, for transactions ending in `RETURN`.
    async fn returned<T: DeserializeOwned>(&self, sql: &str, binds: Binds) -> Result<Option<T>> {
        let mut response = self.run(sql, binds).await?;
        let last = response.num_statements().saturating_sub(1);
        let value: Option<JsonValue> = response.take(last).map_err(db_err)?;
        match value {
            Some(JsonValue::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn count(&self, sql: &str, binds: Binds) -> Result<u64> {
        Ok(total_of(&self.rows(sql, binds).await?))
    }

    async fn by_field<T: DeserializeOwned>(
        &self,
        table: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<Option<T>> {
        let sql = format!("SELECT * OMIT id FROM {} WHERE {} = $value LIMIT 1", table, field);
        self.first(&sql, vec![("value", json!(value))]).await
    }

    async fn by_id<T: DeserializeOwned>(&self, table: &'static str, id: &str) -> Result<Option<T>> {
        self.by_field(table, "`_id`", id).await
    }

    async fn by_ids<T: DeserializeOwned>(&self, table: &'static str, ids: &[String]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * OMIT id FROM {} WHERE `_id` INSIDE $ids", table);
        self.all(&sql, vec![("ids", json!(ids))]).await
    }

    async fn create<T: Serialize>(&self, table: &'static str, id: &str, value: &T) -> Result<()> {
        self.run(
            "CREATE type::thing($tb, $id) CONTENT $doc RETURN NONE",
            vec![("tb", json!(table)), ("id", json!(id)), ("doc", doc(value)?)],
        )
        .await?;
        Ok(())
    }

    /// Replaces the document whose `_id` matches; `NotFound` when there is none.
    async fn replace<T: Serialize>(
        &self,
        table: &'static str,
        what: &str,
        id: &str,
        value: &T,
    ) -> Result<()> {
        let sql = format!("UPDATE {} CONTENT $doc WHERE `_id` = $id RETURN AFTER", table);
        let updated = self
            .rows(&sql, vec![("id", json!(id)), ("doc", doc(value)?)])
            .await?;
        if updated.is_empty() {
            return Err(BookNestError::not_found(what));
        }
        Ok(())
    }

    async fn slugs_like(&self, table: &'static str, base: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT VALUE slug FROM {} WHERE string::starts_with(slug, $base)",
            table
        );
        let slugs: Vec<String> = self.all(&sql, vec![("base", json!(base))]).await?;
        Ok(slugs
            .into_iter()
            .filter(|s| is_slug_variant(base, s))
            .collect())
    }

    async fn briefs(&self, ids: Vec<String>) -> Result<HashMap<String, UserBrief>> {
        let users: Vec<User> = self.by_ids("users", &ids).await?;
        Ok(users
            .iter()
            .map(|u| (u.id.clone(), UserBrief::from(u)))
            .collect())
    }

    async fn novel_briefs(&self, ids: Vec<String>) -> Result<HashMap<String, NovelBrief>> {
        let novels: Vec<Novel> = self.by_ids("novels", &ids).await?;
        Ok(novels
            .iter()
            .map(|n| (n.id.clone(), NovelBrief::from(n)))
            .collect())
    }

    /// Joins author, category and tag briefs onto listing rows.
    async fn cards(&self, rows: Vec<NovelRow>) -> Result<Vec<NovelCard>> {
        let author_ids: Vec<String> = rows.iter().map(|r| r.novel.author.clone()).collect();
        let category_ids: Vec<String> = rows.iter().map(|r| r.novel.category.clone()).collect();
        let tag_ids: Vec<String> = rows
            .iter()
            .flat_map(|r| r.novel.tags.iter().cloned())
            .collect();

        let (authors, categories, tags) = tokio::try_join!(
            self.by_ids::<Author>("authors", &author_ids),
            self.by_ids::<Category>("categories", &category_ids),
            self.by_ids::<Tag>("tags", &tag_ids),
        )?;
        let authors: HashMap<&str, AuthorBrief> = authors
            .iter()
            .map(|a| (a.id.as_str(), AuthorBrief::from(a)))
            .collect();
        let categories: HashMap<&str, CategoryBrief> = categories
            .iter()
            .map(|c| (c.id.as_str(), CategoryBrief::from(c)))
            .collect();
        let tags: HashMap<&str, TagBrief> = tags
            .iter()
            .map(|t| (t.id.as_str(), TagBrief::from(t)))
            .collect();

        Ok(rows
            .iter()
            .map(|row| {
                let novel_tags = row
                    .novel
                    .tags
                    .iter()
                    .filter_map(|id| tags.get(id.as_str()).cloned())
                    .collect();
                NovelCard::assemble(
                    &row.novel,
                    authors.get(row.novel.author.as_str()).cloned(),
                    categories.get(row.novel.category.as_str()).cloned(),
                    novel_tags,
                    row.stats,
                )
            })
            .collect())
    }

    async fn cards_for(&self, ids: &[String]) -> Result<Vec<NovelCard>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * OMIT id FROM {} WHERE `_id` INSIDE $ids", CARD_SOURCE);
        let rows: Vec<NovelRow> = self.all(&sql, vec![("ids", json!(ids))]).await?;
        self.cards(rows).await
    }

    async fn comment_views(&self, rows: Vec<CommentRow>) -> Result<Vec<CommentView>> {
        let users = self
            .briefs(rows.iter().map(|r| r.comment.auth.clone()).collect())
            .await?;
        Ok(rows
            .iter()
            .map(|r| CommentView::assemble(&r.comment, users.get(&r.comment.auth).cloned(), r.rep_count))
            .collect())
    }

    async fn comments_where(&self, condition: &str, order: &str, binds: Binds) -> Result<Vec<CommentView>> {
        let sql = format!(
            "SELECT *, count((SELECT `_id` FROM comments WHERE parent = $parent.`_id` AND approved = true)) AS repCount \
             OMIT id FROM comments WHERE {} ORDER BY createdAt {}",
            condition, order
        );
        let rows: Vec<CommentRow> = self.all(&sql, binds).await?;
        self.comment_views(rows).await
    }

    async fn message_views(&self, messages: Vec<Message>) -> Result<Vec<MessageView>> {
        let ids: Vec<String> = messages
            .iter()
            .flat_map(|m| std::iter::once(m.sender.clone()).chain(m.reciever.iter().cloned()))
            .collect();
        let users = self.briefs(ids).await?;
        Ok(messages
            .iter()
            .map(|m| {
                let reciever = m
                    .reciever
                    .iter()
                    .filter_map(|id| users.get(id).cloned())
                    .collect();
                MessageView::assemble(m, users.get(&m.sender).cloned(), reciever)
            })
            .collect())
    }
}

#[async_trait]
impl Store for SurrealStore {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    async fn ping(&self) -> Result<()> {
        self.db.health().await.map_err(db_err)
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        if self.user_by_username(&user.username).await?.is_some() {
            return Err(BookNestError::conflict("Username already exists"));
        }
        if self.user_by_email(&user.email).await?.is_some() {
            return Err(BookNestError::conflict("Email already exists"));
        }
        self.create("users", &user.id, &user).await
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.by_id("users", id).await
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.by_field("users", "username", username).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.by_field("users", "email", &email.trim().to_lowercase())
            .await
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        self.by_ids("users", ids).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.all("SELECT * OMIT id FROM users ORDER BY createdAt DESC", Vec::new())
            .await
    }

    async fn count_users(&self) -> Result<u64> {
        self.count("SELECT count() AS total FROM users GROUP ALL", Vec::new())
            .await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.replace("users", "User", &user.id, user).await
    }

    async fn debit_goldcard(&self, user_id: &str, amount: u32) -> Result<u32> {
        let sql = r#"
            BEGIN TRANSACTION;
            LET $found = (SELECT goldcard FROM users WHERE `_id` = $user)[0];
            IF $found = NONE { THROW "booknest:not_found:User" };
            IF $found.goldcard < $amount { THROW "booknest:insufficient" };
            UPDATE users SET goldcard -= $amount, updatedAt = $now WHERE `_id` = $user RETURN NONE;
            RETURN $found.goldcard - $amount;
            COMMIT TRANSACTION;
        "#;
        let binds = vec![
            ("user", json!(user_id)),
            ("amount", json!(amount)),
            ("now", json!(format_timestamp(&now()))),
        ];
        self.returned(sql, binds)
            .await?
            .ok_or_else(|| BookNestError::Database("debit returned nothing".into()))
    }

    async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let bind = || vec![("user", json!(user_id))];
        let (chap_count, posted, followed) = tokio::try_join!(
            self.count("SELECT count() AS total FROM chaps WHERE poster = $user GROUP ALL", bind()),
            self.count("SELECT count() AS total FROM novels WHERE poster = $user GROUP ALL", bind()),
            self.count("SELECT count() AS total FROM follows WHERE follower = $user GROUP ALL", bind()),
        )?;
        Ok(UserStats {
            chap_count,
            posted,
            followed,
        })
    }

    async fn insert_author(&self, author: Author) -> Result<()> {
        self.create("authors", &author.id, &author).await
    }

    async fn author_by_id(&self, id: &str) -> Result<Option<Author>> {
        self.by_id("authors", id).await
    }

    async fn author_by_slug(&self, slug: &str) -> Result<Option<Author>> {
        self.by_field("authors", "slug", slug).await
    }

    async fn search_authors(&self, text: &str, limit: usize) -> Result<Vec<Author>> {
        let Some(search) = booknest_core::listing::SearchText::new(text) else {
            return Ok(Vec::new());
        };
        let sql = "SELECT *, string::lowercase(name) AS name_key OMIT id FROM authors \
                   WHERE string::contains(string::lowercase(name), $q) \
                   OR ($slug != '' AND string::contains(slug, $slug)) \
                   ORDER BY name_key ASC LIMIT $limit";
        self.all(
            sql,
            vec![
                ("q", json!(search.lowered())),
                ("slug", json!(search.slug())),
                ("limit", json!(limit)),
            ],
        )
        .await
    }

    async fn author_slugs_like(&self, base: &str) -> Result<Vec<String>> {
        self.slugs_like("authors", base).await
    }

    async fn count_author_novels(&self, author_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM novels WHERE author = $author AND approved = true GROUP ALL",
            vec![("author", json!(author_id))],
        )
        .await
    }

    async fn insert_category(&self, category: Category) -> Result<()> {
        self.create("categories", &category.id, &category).await
    }

    async fn category_by_id(&self, id: &str) -> Result<Option<Category>> {
        self.by_id("categories", id).await
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.by_field("categories", "slug", slug).await
    }

    async fn list_categories(&self) -> Result<Vec<CategoryView>> {
        let sql = "SELECT *, \
                   count((SELECT `_id` FROM novels WHERE category = $parent.`_id` AND approved = true)) AS novelCount, \
                   string::lowercase(cate) AS cate_key \
                   OMIT id FROM categories ORDER BY cate_key ASC";
        let rows: Vec<CategoryRow> = self.all(sql, Vec::new()).await?;
        Ok(rows
            .into_iter()
            .map(|r| CategoryView {
                category: r.category,
                novel_count: r.novel_count,
            })
            .collect())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        self.replace("categories", "Category", &category.id, category)
            .await
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        let gone = self
            .rows(
                "DELETE categories WHERE `_id` = $id RETURN BEFORE",
                vec![("id", json!(id))],
            )
            .await?;
        if gone.is_empty() {
            return Err(BookNestError::not_found("Category"));
        }
        Ok(())
    }

    async fn count_category_novels(&self, category_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM novels WHERE category = $category GROUP ALL",
            vec![("category", json!(category_id))],
        )
        .await
    }

    async fn reassign_novels(&self, from: &str, to: &str) -> Result<u64> {
        let moved = self
            .rows(
                "UPDATE novels SET category = $to WHERE category = $from RETURN BEFORE",
                vec![("from", json!(from)), ("to", json!(to))],
            )
            .await?;
        Ok(moved.len() as u64)
    }

    async fn delete_novels_in_category(&self, category_id: &str) -> Result<u64> {
        let sql = r#"
            BEGIN TRANSACTION;
            LET $ids = (SELECT VALUE `_id` FROM novels WHERE category = $category);
            DELETE novels WHERE `_id` INSIDE $ids;
            DELETE chaps WHERE novel INSIDE $ids;
            DELETE follows WHERE novel INSIDE $ids;
            DELETE ratings WHERE novel INSIDE $ids;
            DELETE comments WHERE novel INSIDE $ids;
            DELETE votes WHERE novel INSIDE $ids;
            DELETE notifications WHERE novel INSIDE $ids;
            RETURN array::len($ids);
            COMMIT TRANSACTION;
        "#;
        Ok(self
            .returned(sql, vec![("category", json!(category_id))])
            .await?
            .unwrap_or(0))
    }

    async fn insert_tag(&self, tag: Tag) -> Result<()> {
        let clash = self
            .count(
                "SELECT count() AS total FROM tags WHERE slug = $slug \
                 OR string::lowercase(name) = string::lowercase($name) GROUP ALL",
                vec![("slug", json!(tag.slug)), ("name", json!(tag.name))],
            )
            .await?;
        if clash > 0 {
            return Err(BookNestError::conflict("Tag with this name already exists"));
        }
        self.create("tags", &tag.id, &tag).await
    }

    async fn tag_by_id(&self, id: &str) -> Result<Option<Tag>> {
        self.by_id("tags", id).await
    }

    async fn tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        self.by_field("tags", "slug", slug).await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.all(
            "SELECT *, string::lowercase(name) AS name_key OMIT id FROM tags ORDER BY name_key ASC",
            Vec::new(),
        )
        .await
    }

    async fn update_tag(&self, tag: &Tag) -> Result<()> {
        self.replace("tags", "Tag", &tag.id, tag).await
    }

    async fn delete_tag(&self, id: &str) -> Result<()> {
        let sql = r#"
            BEGIN TRANSACTION;
            LET $gone = (DELETE tags WHERE `_id` = $id RETURN BEFORE);
            IF array::len($gone) = 0 { THROW "booknest:not_found:Tag" };
            UPDATE novels SET tags -= $id WHERE tags CONTAINS $id RETURN NONE;
            COMMIT TRANSACTION;
        "#;
        self.run(sql, vec![("id", json!(id))]).await?;
        Ok(())
    }

    async fn insert_novel(&self, novel: Novel) -> Result<()> {
        debug!(novel = %novel.slug, "inserting novel");
        self.create("novels", &novel.id, &novel).await
    }

    async fn novel_by_id(&self, id: &str) -> Result<Option<Novel>> {
        self.by_id("novels", id).await
    }

    async fn novel_by_slug(&self, slug: &str) -> Result<Option<Novel>> {
        self.by_field("novels", "slug", slug).await
    }

    async fn novel_slugs_like(&self, base: &str) -> Result<Vec<String>> {
        self.slugs_like("novels", base).await
    }

    async fn update_novel(&self, novel: &Novel) -> Result<()> {
        self.replace("novels", "Novel", &novel.id, novel).await
    }

    async fn delete_novel(&self, id: &str) -> Result<()> {
        let sql = r#"
            BEGIN TRANSACTION;
            LET $gone = (DELETE novels WHERE `_id` = $id RETURN BEFORE);
            IF array::len($gone) = 0 { THROW "booknest:not_found:Novel" };
            DELETE chaps WHERE novel = $id;
            DELETE follows WHERE novel = $id;
            DELETE ratings WHERE novel = $id;
            DELETE comments WHERE novel = $id;
            DELETE votes WHERE novel = $id;
            DELETE notifications WHERE novel = $id;
            COMMIT TRANSACTION;
        "#;
        self.run(sql, vec![("id", json!(id))]).await?;
        debug!(novel_id = %id, "novel deleted with its related documents");
        Ok(())
    }

    async fn list_novels(&self, query: &NovelQuery) -> Result<NovelPage> {
        let rendered = RenderedListing::render(query);
        let mut page_binds = rendered.binds.clone();
        page_binds.push(("limit", json!(query.per_page)));
        page_binds.push(("start", json!(query.offset())));
        let page_sql = rendered.page_sql();
        let count_sql = rendered.count_sql();

        let (rows, total) = tokio::try_join!(
            self.all::<NovelRow>(&page_sql, page_binds),
            self.count(&count_sql, rendered.binds.clone()),
        )?;
        let novels = self.cards(rows).await?;
        Ok(NovelPage::new(novels, total, query))
    }

    async fn novel_card(&self, id: &str) -> Result<Option<NovelCard>> {
        Ok(self.cards_for(&[id.to_string()]).await?.into_iter().next())
    }

    async fn increment_views(&self, id: &str) -> Result<()> {
        let touched = self
            .rows(
                "UPDATE novels SET views += 1 WHERE `_id` = $id RETURN AFTER",
                vec![("id", json!(id))],
            )
            .await?;
        if touched.is_empty() {
            return Err(BookNestError::not_found("Novel"));
        }
        Ok(())
    }

    async fn count_novels(&self, approved: Option<bool>) -> Result<u64> {
        match approved {
            Some(approved) => {
                self.count(
                    "SELECT count() AS total FROM novels WHERE approved = $approved GROUP ALL",
                    vec![("approved", json!(approved))],
                )
                .await
            }
            None => {
                self.count("SELECT count() AS total FROM novels GROUP ALL", Vec::new())
                    .await
            }
        }
    }

    async fn insert_chap(&self, mut chap: Chap) -> Result<Chap> {
        let sql = r#"
            BEGIN TRANSACTION;
            IF array::len((SELECT `_id` FROM novels WHERE `_id` = $novel)) = 0 { THROW "booknest:not_found:Novel" };
            LET $numbers = (SELECT VALUE chap FROM chaps WHERE novel = $novel);
            LET $next = IF array::len($numbers) = 0 { 1 } ELSE { math::max($numbers) + 1 };
            CREATE type::thing('chaps', $id) CONTENT $doc RETURN NONE;
            UPDATE chaps SET chap = $next WHERE `_id` = $id RETURN NONE;
            UPDATE novels SET updatedAt = $now WHERE `_id` = $novel RETURN NONE;
            RETURN $next;
            COMMIT TRANSACTION;
        "#;
        let binds = vec![
            ("novel", json!(chap.novel)),
            ("id", json!(chap.id)),
            ("doc", doc(&chap)?),
            ("now", json!(format_timestamp(&now()))),
        ];
        chap.chap = self
            .returned(sql, binds)
            .await?
            .ok_or_else(|| BookNestError::Database("chapter number missing".into()))?;
        Ok(chap)
    }

    async fn chapter_page(&self, novel_id: &str, page: usize) -> Result<(Vec<ChapSummary>, u64)> {
        let start = page_offset(page, CHAPTERS_PER_PAGE);
        let (items, total) = tokio::try_join!(
            self.all::<ChapSummary>(
                "SELECT * OMIT id, content FROM chaps WHERE novel = $novel ORDER BY chap ASC LIMIT $limit START $start",
                vec![
                    ("novel", json!(novel_id)),
                    ("limit", json!(CHAPTERS_PER_PAGE)),
                    ("start", json!(start)),
                ],
            ),
            self.count(
                "SELECT count() AS total FROM chaps WHERE novel = $novel GROUP ALL",
                vec![("novel", json!(novel_id))],
            ),
        )?;
        Ok((items, total))
    }

    async fn all_chapters(&self, novel_id: &str) -> Result<Vec<ChapSummary>> {
        self.all(
            "SELECT * OMIT id, content FROM chaps WHERE novel = $novel ORDER BY chap ASC",
            vec![("novel", json!(novel_id))],
        )
        .await
    }

    async fn chap_by_number(&self, novel_id: &str, chap: u32) -> Result<Option<Chap>> {
        self.first(
            "SELECT * OMIT id FROM chaps WHERE novel = $novel AND chap = $chap LIMIT 1",
            vec![("novel", json!(novel_id)), ("chap", json!(chap))],
        )
        .await
    }

    async fn insert_follow(&self, follow: Follow) -> Result<Follow> {
        let existing: Option<Follow> = self
            .first(
                "SELECT * OMIT id FROM follows WHERE novel = $novel AND follower = $follower LIMIT 1",
                vec![("novel", json!(follow.novel)), ("follower", json!(follow.follower))],
            )
            .await?;
        if let Some(existing) = existing {
            return Ok(existing);
        }
        match self.create("follows", &follow.id, &follow).await {
            Ok(()) => Ok(follow),
            // lost a race against the same follow; the unique index kept one
            Err(BookNestError::Conflict(_)) => self
                .first(
                    "SELECT * OMIT id FROM follows WHERE novel = $novel AND follower = $follower LIMIT 1",
                    vec![("novel", json!(follow.novel)), ("follower", json!(follow.follower))],
                )
                .await?
                .ok_or_else(|| BookNestError::Database("follow vanished".into())),
            Err(e) => Err(e),
        }
    }

    async fn delete_follow(&self, novel_id: &str, follower: &str) -> Result<bool> {
        let gone = self
            .rows(
                "DELETE follows WHERE novel = $novel AND follower = $follower RETURN BEFORE",
                vec![("novel", json!(novel_id)), ("follower", json!(follower))],
            )
            .await?;
        Ok(!gone.is_empty())
    }

    async fn follow_exists(&self, novel_id: &str, follower: &str) -> Result<bool> {
        let n = self
            .count(
                "SELECT count() AS total FROM follows WHERE novel = $novel AND follower = $follower GROUP ALL",
                vec![("novel", json!(novel_id)), ("follower", json!(follower))],
            )
            .await?;
        Ok(n > 0)
    }

    async fn follower_ids(&self, novel_id: &str) -> Result<Vec<String>> {
        self.all(
            "SELECT VALUE follower FROM follows WHERE novel = $novel",
            vec![("novel", json!(novel_id))],
        )
        .await
    }

    async fn followed_novels(&self, follower: &str) -> Result<Vec<FollowView>> {
        let follows: Vec<Follow> = self
            .all(
                "SELECT * OMIT id FROM follows WHERE follower = $follower",
                vec![("follower", json!(follower))],
            )
            .await?;
        let ids: Vec<String> = follows.iter().map(|f| f.novel.clone()).collect();
        let cards: HashMap<String, NovelCard> = self
            .cards_for(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let mut views: Vec<FollowView> = follows
            .into_iter()
            .filter_map(|f| {
                cards.get(&f.novel).cloned().map(|novel| FollowView {
                    id: f.id,
                    follower: f.follower,
                    novel,
                })
            })
            .collect();
        views.sort_by(|a, b| b.novel.updated_at.cmp(&a.novel.updated_at));
        Ok(views)
    }

    async fn insert_rating(&self, rating: Rating) -> Result<Novel> {
        let sql = r#"
            BEGIN TRANSACTION;
            IF array::len((SELECT `_id` FROM novels WHERE `_id` = $novel)) = 0 { THROW "booknest:not_found:Novel" };
            IF array::len((SELECT `_id` FROM ratings WHERE novel = $novel AND rater = $rater)) > 0 {
                THROW "booknest:conflict:User has already rated this novel"
            };
            CREATE type::thing('ratings', $id) CONTENT $doc RETURN NONE;
            UPDATE novels SET scores = (scores * rate_nums + $score) / (rate_nums + 1), rate_nums += 1
                WHERE `_id` = $novel RETURN NONE;
            RETURN (SELECT * OMIT id FROM novels WHERE `_id` = $novel)[0];
            COMMIT TRANSACTION;
        "#;
        let binds = vec![
            ("novel", json!(rating.novel)),
            ("rater", json!(rating.rater)),
            ("id", json!(rating.id)),
            ("score", json!(rating.scores)),
            ("doc", doc(&rating)?),
        ];
        self.returned(sql, binds)
            .await?
            .ok_or_else(|| BookNestError::not_found("Novel"))
    }

    async fn rating_exists(&self, novel_id: &str, rater: &str) -> Result<bool> {
        let n = self
            .count(
                "SELECT count() AS total FROM ratings WHERE novel = $novel AND rater = $rater GROUP ALL",
                vec![("novel", json!(novel_id)), ("rater", json!(rater))],
            )
            .await?;
        Ok(n > 0)
    }

    async fn ratings_for_novel(&self, novel_id: &str) -> Result<Vec<RatingView>> {
        let ratings: Vec<Rating> = self
            .all(
                "SELECT * OMIT id FROM ratings WHERE novel = $novel ORDER BY `_id` DESC",
                vec![("novel", json!(novel_id))],
            )
            .await?;
        let users = self
            .briefs(ratings.iter().map(|r| r.rater.clone()).collect())
            .await?;
        Ok(ratings
            .iter()
            .map(|r| RatingView::assemble(r, users.get(&r.rater).cloned()))
            .collect())
    }

    async fn insert_vote(&self, vote: Vote) -> Result<u32> {
        let sql = r#"
            BEGIN TRANSACTION;
            IF array::len((SELECT `_id` FROM novels WHERE `_id` = $novel)) = 0 { THROW "booknest:not_found:Novel" };
            LET $found = (SELECT goldcard FROM users WHERE `_id` = $voter)[0];
            IF $found = NONE { THROW "booknest:not_found:User" };
            IF $found.goldcard < $amount { THROW "booknest:insufficient" };
            UPDATE users SET goldcard -= $amount, updatedAt = $now WHERE `_id` = $voter RETURN NONE;
            CREATE type::thing('votes', $id) CONTENT $doc RETURN NONE;
            RETURN $found.goldcard - $amount;
            COMMIT TRANSACTION;
        "#;
        let binds = vec![
            ("novel", json!(vote.novel)),
            ("voter", json!(vote.voter)),
            ("amount", json!(vote.goldcard)),
            ("id", json!(vote.id)),
            ("doc", doc(&vote)?),
            ("now", json!(format_timestamp(&now()))),
        ];
        self.returned(sql, binds)
            .await?
            .ok_or_else(|| BookNestError::Database("vote returned nothing".into()))
    }

    async fn votes_by_user(&self, voter: &str) -> Result<Vec<VoteView>> {
        let votes: Vec<Vote> = self
            .all(
                "SELECT * OMIT id FROM votes WHERE voter = $voter ORDER BY createdAt DESC",
                vec![("voter", json!(voter))],
            )
            .await?;
        let novels = self
            .novel_briefs(votes.iter().map(|v| v.novel.clone()).collect())
            .await?;
        Ok(votes
            .iter()
            .map(|v| VoteView::assemble(v, novels.get(&v.novel).cloned()))
            .collect())
    }

    async fn insert_comment(&self, comment: Comment) -> Result<()> {
        self.create("comments", &comment.id, &comment).await
    }

    async fn comment_by_id(&self, id: &str) -> Result<Option<Comment>> {
        self.by_id("comments", id).await
    }

    async fn root_comments(&self, novel_id: &str) -> Result<Vec<CommentView>> {
        self.comments_where(
            "novel = $novel AND parent = NONE AND approved = true",
            "DESC",
            vec![("novel", json!(novel_id))],
        )
        .await
    }

    async fn replies(&self, parent_id: &str) -> Result<Vec<CommentView>> {
        self.comments_where(
            "parent = $parent_id AND approved = true",
            "ASC",
            vec![("parent_id", json!(parent_id))],
        )
        .await
    }

    async fn pending_comments(&self) -> Result<Vec<CommentView>> {
        self.comments_where("approved = false", "ASC", Vec::new())
            .await
    }

    async fn approve_comment(&self, id: &str) -> Result<Comment> {
        let rows = self
            .rows(
                "UPDATE comments SET approved = true, updatedAt = $now WHERE `_id` = $id RETURN AFTER",
                vec![("id", json!(id)), ("now", json!(format_timestamp(&now())))],
            )
            .await?;
        decode::<Comment>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BookNestError::not_found("Comment"))
    }

    async fn delete_comment(&self, id: &str) -> Result<u64> {
        if self.comment_by_id(id).await?.is_none() {
            return Err(BookNestError::not_found("Comment"));
        }
        let mut doomed = vec![id.to_string()];
        let mut frontier = doomed.clone();
        while !frontier.is_empty() {
            frontier = self
                .all(
                    "SELECT VALUE `_id` FROM comments WHERE parent INSIDE $ids",
                    vec![("ids", json!(frontier))],
                )
                .await?;
            doomed.extend(frontier.iter().cloned());
        }
        self.run(
            "DELETE comments WHERE `_id` INSIDE $ids",
            vec![("ids", json!(doomed))],
        )
        .await?;
        Ok(doomed.len() as u64)
    }

    async fn insert_message(&self, message: Message) -> Result<()> {
        self.create("messages", &message.id, &message).await
    }

    async fn messages_sent(&self, sender: &str) -> Result<Vec<MessageView>> {
        let messages: Vec<Message> = self
            .all(
                "SELECT * OMIT id FROM messages WHERE sender = $user ORDER BY createdAt DESC",
                vec![("user", json!(sender))],
            )
            .await?;
        self.message_views(messages).await
    }

    async fn messages_received(&self, reciever: &str) -> Result<Vec<MessageView>> {
        let messages: Vec<Message> = self
            .all(
                "SELECT * OMIT id FROM messages WHERE reciever CONTAINS $user ORDER BY createdAt DESC",
                vec![("user", json!(reciever))],
            )
            .await?;
        self.message_views(messages).await
    }

    async fn insert_notifications(&self, notis: Vec<Notification>) -> Result<()> {
        if notis.is_empty() {
            return Ok(());
        }
        let docs = notis.iter().map(doc).collect::<Result<Vec<_>>>()?;
        self.run(
            "FOR $doc IN $docs { CREATE type::thing('notifications', $doc.`_id`) CONTENT $doc RETURN NONE; }",
            vec![("docs", JsonValue::Array(docs))],
        )
        .await?;
        Ok(())
    }

    async fn notification_feed(&self, user_id: &str) -> Result<NotificationFeed> {
        let (notis, count) = tokio::try_join!(
            self.all::<Notification>(
                "SELECT * OMIT id FROM notifications WHERE user = $user ORDER BY createdAt DESC LIMIT $limit",
                vec![("user", json!(user_id)), ("limit", json!(NOTIFICATIONS_PAGE))],
            ),
            self.count(
                "SELECT count() AS total FROM notifications WHERE user = $user AND read = false GROUP ALL",
                vec![("user", json!(user_id))],
            ),
        )?;
        let (novels, senders) = tokio::try_join!(
            self.novel_briefs(notis.iter().filter_map(|n| n.novel.clone()).collect()),
            self.briefs(notis.iter().filter_map(|n| n.sender.clone()).collect()),
        )?;
        let notis = notis
            .iter()
            .map(|n| {
                NotificationView::assemble(
                    n,
                    n.novel.as_ref().and_then(|id| novels.get(id).cloned()),
                    n.sender.as_ref().and_then(|id| senders.get(id).cloned()),
                )
            })
            .collect();
        Ok(NotificationFeed { notis, count })
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let changed = self
            .rows(
                "UPDATE notifications SET read = true WHERE user = $user AND read = false RETURN BEFORE",
                vec![("user", json!(user_id))],
            )
            .await?;
        Ok(changed.len() as u64)
    }

    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        let changed = self
            .rows(
                "UPDATE notifications SET read = true \
                 WHERE user = $user AND read = false AND `_id` INSIDE $ids RETURN BEFORE",
                vec![("user", json!(user_id)), ("ids", json!(ids))],
            )
            .await?;
        Ok(changed.len() as u64)
    }

    async fn load_settings(&self) -> Result<Option<SiteSettings>> {
        let sql = format!("SELECT * OMIT id FROM {}", SETTINGS_RECORD);
        self.first(&sql, Vec::new()).await
    }

    async fn save_settings(&self, settings: &SiteSettings) -> Result<()> {
        let sql = format!("UPSERT {} CONTENT $doc RETURN NONE", SETTINGS_RECORD);
        self.run(&sql, vec![("doc", doc(settings)?)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booknest_core::listing::{ChapterBucket, ListTurn};
    use booknest_core::slug::slugify;

    async fn store() -> SurrealStore {
        SurrealStore::connect(&SurrealDbConfig {
            connection: "mem://".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    async fn user(store: &SurrealStore, name: &str) -> User {
        let user = User::new(name, &format!("{}@example.com", name), "hash".into()).unwrap();
        store.insert_user(user.clone()).await.unwrap();
        user
    }

    async fn novel(store: &SurrealStore, title: &str, poster: &str, category: &str) -> Novel {
        let novel = Novel::from_draft(NovelDraft {
            title: title.into(),
            slug: slugify(title),
            description: None,
            image: None,
            author: "author-1".into(),
            category: category.into(),
            poster: poster.into(),
            tags: vec![],
            status: NovelStatus::Continue,
            approved: true,
        })
        .unwrap();
        store.insert_novel(novel.clone()).await.unwrap();
        novel
    }

    async fn add_chaps(store: &SurrealStore, novel_id: &str, poster: &str, n: usize) -> Vec<u32> {
        let mut numbers = Vec::new();
        for i in 0..n {
            let chap = Chap::new(novel_id, poster, &format!("Chương {}", i + 1), "nội dung").unwrap();
            numbers.push(store.insert_chap(chap).await.unwrap().chap);
        }
        numbers
    }

    #[test]
    fn public_listing_renders_approval_and_default_order() {
        let r = RenderedListing::render(&NovelQuery::public());
        assert_eq!(r.where_clause(), " WHERE approved = $approved");
        assert_eq!(r.order, "updatedAt DESC, `_id` ASC");
        assert_eq!(r.binds, vec![("approved", json!(true))]);
    }

    #[test]
    fn filters_and_bucket_bounds_become_conditions() {
        let q = NovelQuery::public()
            .in_category("c1")
            .with_status(Some(NovelStatus::Completed))
            .with_bucket(ChapterBucket::From100To500)
            .sorted_by(SortKey::Rating);
        let r = RenderedListing::render(&q);
        assert_eq!(
            r.conditions,
            vec![
                "category = $category",
                "status = $status",
                "approved = $approved",
                "chapCount >= $chap_min",
                "chapCount <= $chap_max",
            ]
        );
        assert!(r.binds.contains(&("status", json!("completed"))));
        assert!(r.binds.contains(&("chap_max", json!(500))));
        assert_eq!(r.order, "scores DESC, rate_nums DESC, updatedAt DESC, `_id` ASC");
    }

    #[test]
    fn turns_and_search_render() {
        let q = ListTurn::HasNewChap
            .apply(NovelQuery::public())
            .searching(Some("Đấu Phá"));
        let r = RenderedListing::render(&q);
        assert!(r.conditions.contains(&"chapCount > 0".to_string()));
        assert!(r.binds.contains(&("search", json!("đấu phá"))));
        assert!(r.binds.contains(&("search_slug", json!("dau-pha"))));

        let sql = r.page_sql();
        assert!(sql.starts_with("SELECT * OMIT id FROM (SELECT *,"));
        assert!(sql.ends_with("LIMIT $limit START $start"));
        assert!(r.count_sql().ends_with("GROUP ALL"));
    }

    #[test]
    fn thrown_markers_map_to_domain_errors() {
        let e = classify_errors([
            "The query was not executed due to a failed transaction".to_string(),
            "An error occurred: booknest:not_found:Novel".to_string(),
        ]);
        assert!(matches!(e, BookNestError::NotFound(ref w) if w == "Novel"));

        let e = classify_errors(["An error occurred: booknest:insufficient".to_string()]);
        assert!(matches!(e, BookNestError::InsufficientBalance));

        let e = classify_errors([
            "Database index `ratings_pair` already contains ['n1', 'u1']".to_string(),
        ]);
        assert!(matches!(e, BookNestError::Conflict(_)));

        let e = classify_errors(["connection reset".to_string()]);
        assert!(matches!(e, BookNestError::Database(ref m) if m == "connection reset"));
    }

    #[test]
    fn totals_default_to_zero() {
        assert_eq!(total_of(&[]), 0);
        assert_eq!(total_of(&[json!({"total": 7})]), 7);
    }

    #[tokio::test]
    async fn embedded_listing_filters_sorts_and_counts() {
        let store = store().await;
        let u = user(&store, "uploader1").await;
        let mut ids = Vec::new();
        for (i, title) in ["Một", "Hai", "Ba", "Bốn", "Năm"].iter().enumerate() {
            let mut n = novel(&store, title, &u.id, if i % 2 == 0 { "even" } else { "odd" }).await;
            n.views = (i as u64 + 1) * 10;
            store.update_novel(&n).await.unwrap();
            ids.push(n.id);
        }
        let mut pending = novel(&store, "Chờ duyệt", &u.id, "even").await;
        pending.approved = false;
        store.update_novel(&pending).await.unwrap();
        add_chaps(&store, &ids[4], &u.id, 2).await;

        let page = store
            .list_novels(&NovelQuery::public().sorted_by(SortKey::Views).paged(Some(1), 2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        let titles: Vec<&str> = page.novels.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Năm", "Bốn"]);

        let last = store
            .list_novels(&NovelQuery::public().sorted_by(SortKey::Views).paged(Some(3), 2))
            .await
            .unwrap();
        assert_eq!(last.novels.len(), 1);
        assert_eq!(last.novels[0].title, "Một");

        let even = store
            .list_novels(&NovelQuery::public().in_category("even"))
            .await
            .unwrap();
        assert_eq!(even.total, 3);

        let with_chaps = store
            .list_novels(&ListTurn::HasNewChap.apply(NovelQuery::public()))
            .await
            .unwrap();
        assert_eq!(with_chaps.total, 1);
        assert_eq!(with_chaps.novels[0].stats.chap_count, 2);

        let found = store
            .list_novels(&NovelQuery::public().searching(Some("bon")))
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.novels[0].title, "Bốn");

        let queue = store
            .list_novels(&NovelQuery::all().approved(Some(false)))
            .await
            .unwrap();
        assert_eq!(queue.total, 1);
        assert_eq!(store.count_novels(None).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn embedded_chapters_number_in_insert_order() {
        let store = store().await;
        let u = user(&store, "uploader1").await;
        let a = novel(&store, "Truyện A", &u.id, "c").await;
        let b = novel(&store, "Truyện B", &u.id, "c").await;

        assert_eq!(add_chaps(&store, &a.id, &u.id, 3).await, vec![1, 2, 3]);
        assert_eq!(add_chaps(&store, &b.id, &u.id, 1).await, vec![1]);

        let chaps = store.all_chapters(&a.id).await.unwrap();
        assert_eq!(chaps.iter().map(|c| c.chap).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(store.chap_by_number(&a.id, 2).await.unwrap().unwrap().title, "Chương 2");

        let orphan = Chap::new("nope", &u.id, "Lạc", "nội dung").unwrap();
        assert!(matches!(
            store.insert_chap(orphan).await,
            Err(BookNestError::NotFound(ref w)) if w == "Novel"
        ));
    }

    #[tokio::test]
    async fn embedded_second_rating_conflicts() {
        let store = store().await;
        let u = user(&store, "reader01").await;
        let v = user(&store, "reader02").await;
        let n = novel(&store, "Hay", &u.id, "c").await;

        store
            .insert_rating(Rating::new(&u.id, &n.id, 5, None).unwrap())
            .await
            .unwrap();
        let updated = store
            .insert_rating(Rating::new(&v.id, &n.id, 2, None).unwrap())
            .await
            .unwrap();
        assert_eq!(updated.rate_nums, 2);
        assert!((updated.scores - 3.5).abs() < 1e-9);

        let again = store
            .insert_rating(Rating::new(&u.id, &n.id, 1, None).unwrap())
            .await;
        assert!(matches!(again, Err(BookNestError::Conflict(_))));
        let stored = store.novel_by_id(&n.id).await.unwrap().unwrap();
        assert_eq!(stored.rate_nums, 2);
        assert!(store.rating_exists(&n.id, &v.id).await.unwrap());
    }

    #[tokio::test]
    async fn embedded_votes_never_overdraw() {
        let store = store().await;
        let u = user(&store, "reader01").await;
        let n = novel(&store, "Hay", &u.id, "c").await;

        let left = store
            .insert_vote(Vote::new(&n.id, &u.id, 15, None).unwrap())
            .await
            .unwrap();
        assert_eq!(left, 5);
        let over = store
            .insert_vote(Vote::new(&n.id, &u.id, 6, None).unwrap())
            .await;
        assert!(matches!(over, Err(BookNestError::InsufficientBalance)));
        assert_eq!(store.user_by_id(&u.id).await.unwrap().unwrap().goldcard, 5);
        assert_eq!(store.votes_by_user(&u.id).await.unwrap().len(), 1);

        let card = store.novel_card(&n.id).await.unwrap().unwrap();
        assert_eq!(card.stats.vote_count, 15);
    }

    #[tokio::test]
    async fn embedded_novel_delete_cascades() {
        let store = store().await;
        let u = user(&store, "reader01").await;
        let n = novel(&store, "Xoá", &u.id, "c").await;
        let keep = novel(&store, "Giữ", &u.id, "c").await;
        add_chaps(&store, &n.id, &u.id, 2).await;
        add_chaps(&store, &keep.id, &u.id, 1).await;
        store.insert_follow(Follow::new(&n.id, &u.id)).await.unwrap();
        store
            .insert_rating(Rating::new(&u.id, &n.id, 4, None).unwrap())
            .await
            .unwrap();
        store
            .insert_comment(Comment::new(&u.id, &n.id, None, "hay", true).unwrap())
            .await
            .unwrap();
        store
            .insert_notifications(vec![Notification::new_chapter(&u.id, &n.id, &n.slug, 2)])
            .await
            .unwrap();

        store.delete_novel(&n.id).await.unwrap();
        assert!(store.novel_by_id(&n.id).await.unwrap().is_none());
        assert!(store.all_chapters(&n.id).await.unwrap().is_empty());
        assert!(!store.follow_exists(&n.id, &u.id).await.unwrap());
        assert!(!store.rating_exists(&n.id, &u.id).await.unwrap());
        assert!(store.root_comments(&n.id).await.unwrap().is_empty());
        assert_eq!(store.notification_feed(&u.id).await.unwrap().count, 0);
        assert_eq!(store.all_chapters(&keep.id).await.unwrap().len(), 1);
        assert!(matches!(
            store.delete_novel(&n.id).await,
            Err(BookNestError::NotFound(_))
        ));
    }
}
