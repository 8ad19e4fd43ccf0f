use serde::{Deserialize, Serialize};

use super::{check_len, check_required, AuthorBrief, CategoryBrief, TagBrief};
use crate::time::{iso_millis, new_id, now, Timestamp};
use crate::{BookNestError, Result};

pub const DEFAULT_NOVEL_DESCRIPTION: &str = "người đăng quá lười không chịu thêm thông tin";
pub const DEFAULT_NOVEL_IMAGE: &str = "/images/tt.jpg";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NovelStatus {
    #[default]
    Continue,
    Completed,
    Drop,
}

impl NovelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NovelStatus::Continue => "continue",
            NovelStatus::Completed => "completed",
            NovelStatus::Drop => "drop",
        }
    }

    /// Lenient parse used for query strings: empty or unknown values mean "no filter".
    pub fn from_query(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            Some("continue") => Some(NovelStatus::Continue),
            Some("completed") => Some(NovelStatus::Completed),
            Some("drop") => Some(NovelStatus::Drop),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Self::from_query(Some(raw)).ok_or_else(|| {
            BookNestError::validation(format!(
                "status must be one of continue, completed, drop (got '{}')",
                raw
            ))
        })
    }
}

fn default_description() -> String {
    DEFAULT_NOVEL_DESCRIPTION.to_string()
}

fn default_image() -> String {
    DEFAULT_NOVEL_IMAGE.to_string()
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Novel {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_image")]
    pub image: String,
    pub author: String,
    pub category: String,
    pub poster: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub status: NovelStatus,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub scores: f64,
    #[serde(default)]
    pub rate_nums: u64,
    #[serde(default)]
    pub modvote: bool,
    #[serde(default = "yes")]
    pub approved: bool,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

/// Everything a new novel needs once author, category and tags are resolved to ids.
#[derive(Debug, Clone)]
pub struct NovelDraft {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub author: String,
    pub category: String,
    pub poster: String,
    pub tags: Vec<String>,
    pub status: NovelStatus,
    pub approved: bool,
}

impl Novel {
    pub fn from_draft(draft: NovelDraft) -> Result<Self> {
        validate_title(&draft.title)?;
        let ts = now();
        Ok(Self {
            id: new_id(),
            title: draft.title.trim().to_string(),
            slug: draft.slug,
            description: draft
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(default_description),
            image: draft
                .image
                .filter(|i| !i.trim().is_empty())
                .unwrap_or_else(default_image),
            author: draft.author,
            category: draft.category,
            poster: draft.poster,
            tags: draft.tags,
            likes: 0,
            status: draft.status,
            views: 0,
            scores: 0.0,
            rate_nums: 0,
            modvote: false,
            approved: draft.approved,
            created_at: ts,
            updated_at: ts,
        })
    }

    /// Folds one more score into the running average.
    pub fn apply_rating(&mut self, score: u8) {
        let total = self.scores * self.rate_nums as f64 + f64::from(score);
        self.rate_nums += 1;
        self.scores = total / self.rate_nums as f64;
    }
}

pub fn validate_title(title: &str) -> Result<()> {
    check_required("title", title)?;
    check_len("title", title.trim(), 255)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NovelStats {
    #[serde(rename = "chapCount", default)]
    pub chap_count: u64,
    #[serde(rename = "followCount", default)]
    pub follow_count: u64,
    #[serde(rename = "voteCount", default)]
    pub vote_count: u64,
}

/// A novel joined with its author, category, tags and related counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NovelCard {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub image: String,
    pub author: Option<AuthorBrief>,
    pub category: Option<CategoryBrief>,
    #[serde(default)]
    pub tags: Vec<TagBrief>,
    pub poster: String,
    pub likes: u64,
    pub status: NovelStatus,
    pub views: u64,
    pub scores: f64,
    pub rate_nums: u64,
    pub modvote: bool,
    pub approved: bool,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub stats: NovelStats,
}

impl NovelCard {
    pub fn assemble(
        novel: &Novel,
        author: Option<AuthorBrief>,
        category: Option<CategoryBrief>,
        tags: Vec<TagBrief>,
        stats: NovelStats,
    ) -> Self {
        Self {
            id: novel.id.clone(),
            title: novel.title.clone(),
            slug: novel.slug.clone(),
            description: novel.description.clone(),
            image: novel.image.clone(),
            author,
            category,
            tags,
            poster: novel.poster.clone(),
            likes: novel.likes,
            status: novel.status,
            views: novel.views,
            scores: novel.scores,
            rate_nums: novel.rate_nums,
            modvote: novel.modvote,
            approved: novel.approved,
            created_at: novel.created_at,
            updated_at: novel.updated_at,
            stats,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NovelBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub image: String,
}

impl From<&Novel> for NovelBrief {
    fn from(novel: &Novel) -> Self {
        Self {
            id: novel.id.clone(),
            title: novel.title.clone(),
            slug: novel.slug.clone(),
            image: novel.image.clone(),
        }
    }
}

pub const CHAPTERS_PER_PAGE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chap {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    /// Per-novel sequence number, starting at 1. Assigned by the store.
    pub chap: u32,
    pub content: String,
    pub novel: String,
    pub poster: String,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Chap {
    /// Builds an unnumbered chapter; `chap` is 0 until the store assigns it.
    pub fn new(novel: &str, poster: &str, title: &str, content: &str) -> Result<Self> {
        let title = title.trim();
        check_required("title", title)?;
        check_len("title", title, 255)?;
        check_required("content", content)?;
        let ts = now();
        Ok(Self {
            id: new_id(),
            title: title.to_string(),
            chap: 0,
            content: content.to_string(),
            novel: novel.to_string(),
            poster: poster.to_string(),
            created_at: ts,
            updated_at: ts,
        })
    }
}

/// Chapter list entry; the content is left out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub chap: u32,
    pub novel: String,
    pub poster: String,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl From<&Chap> for ChapSummary {
    fn from(chap: &Chap) -> Self {
        Self {
            id: chap.id.clone(),
            title: chap.title.clone(),
            chap: chap.chap,
            novel: chap.novel.clone(),
            poster: chap.poster.clone(),
            created_at: chap.created_at,
            updated_at: chap.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NovelDraft {
        NovelDraft {
            title: "Toàn Chức Pháp Sư".into(),
            slug: "toan-chuc-phap-su".into(),
            description: Some("  ".into()),
            image: None,
            author: "a1".into(),
            category: "c1".into(),
            poster: "u1".into(),
            tags: vec![],
            status: NovelStatus::Continue,
            approved: false,
        }
    }

    #[test]
    fn blank_fields_fall_back_to_defaults() {
        let novel = Novel::from_draft(draft()).unwrap();
        assert_eq!(novel.description, DEFAULT_NOVEL_DESCRIPTION);
        assert_eq!(novel.image, DEFAULT_NOVEL_IMAGE);
        assert!(!novel.approved);
    }

    #[test]
    fn rating_keeps_running_average() {
        let mut novel = Novel::from_draft(draft()).unwrap();
        novel.apply_rating(5);
        novel.apply_rating(4);
        novel.apply_rating(3);
        assert_eq!(novel.rate_nums, 3);
        assert!((novel.scores - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn status_query_parsing_is_lenient() {
        assert_eq!(NovelStatus::from_query(Some("completed")), Some(NovelStatus::Completed));
        assert_eq!(NovelStatus::from_query(Some("")), None);
        assert_eq!(NovelStatus::from_query(Some("undefined")), None);
        assert!(NovelStatus::parse("paused").is_err());
    }

    #[test]
    fn card_flattens_counts() {
        let novel = Novel::from_draft(draft()).unwrap();
        let card = NovelCard::assemble(
            &novel,
            None,
            None,
            vec![],
            NovelStats {
                chap_count: 3,
                follow_count: 2,
                vote_count: 9,
            },
        );
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["chapCount"], 3);
        assert_eq!(json["followCount"], 2);
        assert_eq!(json["voteCount"], 9);
        assert_eq!(json["status"], "continue");
    }
}
