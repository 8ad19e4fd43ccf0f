//! Novel listing queries: filters, chapter-count buckets, sort keys and paging.
//!
//! A [`NovelQuery`] is backend-neutral. The memory backend evaluates it with
//! [`NovelQuery::matches`] and [`SortKey::compare`]; the SurrealDB backend
//! renders the same predicate and ordering into SurrealQL.

use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{Novel, NovelCard, NovelStats, NovelStatus};
use crate::slug::slugify;
use crate::{BookNestError, Result};

pub const MAX_PER_PAGE: usize = 100;
/// Highest page number a listing will seek to.
pub const MAX_PAGE: usize = 1_000_000;

/// Rows to skip for a 1-based page; never overflows.
pub fn page_offset(page: usize, per_page: usize) -> usize {
    (page.clamp(1, MAX_PAGE) - 1).saturating_mul(per_page)
}

/// Chapter-count ranges selectable with the `cnum` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChapterBucket {
    #[default]
    Any,
    Under100,
    From100To500,
    From501To1000,
    Over1000,
}

impl ChapterBucket {
    pub fn from_query(cnum: Option<u32>) -> Self {
        match cnum {
            Some(1) => ChapterBucket::Under100,
            Some(2) => ChapterBucket::From100To500,
            Some(3) => ChapterBucket::From501To1000,
            Some(4) => ChapterBucket::Over1000,
            _ => ChapterBucket::Any,
        }
    }

    /// Inclusive lower and upper chapter counts.
    pub fn bounds(&self) -> (Option<u64>, Option<u64>) {
        match self {
            ChapterBucket::Any => (None, None),
            ChapterBucket::Under100 => (None, Some(99)),
            ChapterBucket::From100To500 => (Some(100), Some(500)),
            ChapterBucket::From501To1000 => (Some(501), Some(1000)),
            ChapterBucket::Over1000 => (Some(1001), None),
        }
    }

    pub fn contains(&self, chapters: u64) -> bool {
        let (lo, hi) = self.bounds();
        lo.map_or(true, |lo| chapters >= lo) && hi.map_or(true, |hi| chapters <= hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Created,
    #[default]
    Updated,
    Views,
    Likes,
    Follows,
    /// Average score, then number of ratings.
    Rating,
    Votes,
    Chapters,
    /// Title, ascending.
    Title,
}

impl SortKey {
    pub fn from_query(srt: Option<&str>) -> Option<Self> {
        let key = match srt.map(|s| s.trim().to_ascii_lowercase())?.as_str() {
            "new" | "newest" | "created" | "createdat" => SortKey::Created,
            "update" | "updated" | "updatedat" => SortKey::Updated,
            "view" | "views" => SortKey::Views,
            "like" | "likes" => SortKey::Likes,
            "follow" | "follows" => SortKey::Follows,
            "rate" | "rates" | "score" | "scores" => SortKey::Rating,
            "vote" | "votes" => SortKey::Votes,
            "chap" | "chaps" | "chapters" => SortKey::Chapters,
            "name" | "title" => SortKey::Title,
            _ => return None,
        };
        Some(key)
    }

    /// Total order: the key itself, then most recently updated, then id.
    pub fn compare(&self, a: &NovelCard, b: &NovelCard) -> Ordering {
        let primary = match self {
            SortKey::Created => b.created_at.cmp(&a.created_at),
            SortKey::Updated => Ordering::Equal,
            SortKey::Views => b.views.cmp(&a.views),
            SortKey::Likes => b.likes.cmp(&a.likes),
            SortKey::Follows => b.stats.follow_count.cmp(&a.stats.follow_count),
            SortKey::Rating => b
                .scores
                .partial_cmp(&a.scores)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.rate_nums.cmp(&a.rate_nums)),
            SortKey::Votes => b.stats.vote_count.cmp(&a.stats.vote_count),
            SortKey::Chapters => b.stats.chap_count.cmp(&a.stats.chap_count),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        primary
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Named lists reachable under `/novels/turn/{turn}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTurn {
    Newest,
    ModVote,
    HasNewChap,
    MostViews,
    MostLikes,
    MostFollow,
    BestRates,
    BestVotes,
    Completed,
}

impl ListTurn {
    pub fn parse(raw: &str) -> Result<Self> {
        let turn = match raw {
            "newest" | "new" => ListTurn::Newest,
            "modvote" | "hot" => ListTurn::ModVote,
            "hasnewchap" => ListTurn::HasNewChap,
            "mostviews" => ListTurn::MostViews,
            "mostlikes" => ListTurn::MostLikes,
            "mostfollow" => ListTurn::MostFollow,
            "bestrates" => ListTurn::BestRates,
            "bestvotes" => ListTurn::BestVotes,
            "completed" => ListTurn::Completed,
            other => {
                return Err(BookNestError::validation(format!(
                    "unknown list '{}'",
                    other
                )))
            }
        };
        Ok(turn)
    }

    pub fn sort(&self) -> SortKey {
        match self {
            ListTurn::Newest => SortKey::Created,
            ListTurn::ModVote | ListTurn::HasNewChap | ListTurn::Completed => SortKey::Updated,
            ListTurn::MostViews => SortKey::Views,
            ListTurn::MostLikes => SortKey::Likes,
            ListTurn::MostFollow => SortKey::Follows,
            ListTurn::BestRates => SortKey::Rating,
            ListTurn::BestVotes => SortKey::Votes,
        }
    }

    /// Narrows a query to this list. Filters the list itself fixes win over caller filters.
    pub fn apply(&self, mut query: NovelQuery) -> NovelQuery {
        query.sort = self.sort();
        match self {
            ListTurn::ModVote => query.modvote = true,
            ListTurn::HasNewChap => query.has_chapters = true,
            ListTurn::Completed => query.status = Some(NovelStatus::Completed),
            _ => {}
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchText {
    lowered: String,
    slug: String,
}

impl SearchText {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            lowered: trimmed.to_lowercase(),
            slug: slugify(trimmed),
        })
    }

    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Case-insensitive title substring, or slug substring so that searches
    /// typed without diacritics still match.
    pub fn matches(&self, title: &str, slug: &str) -> bool {
        title.to_lowercase().contains(&self.lowered)
            || (!self.slug.is_empty() && slug.contains(&self.slug))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NovelQuery {
    pub category: Option<String>,
    pub author: Option<String>,
    pub poster: Option<String>,
    pub status: Option<NovelStatus>,
    pub bucket: ChapterBucket,
    pub search: Option<SearchText>,
    /// Only editor picks.
    pub modvote: bool,
    /// Only novels with at least one chapter.
    pub has_chapters: bool,
    /// `Some(true)` for public lists, `Some(false)` for the moderation queue.
    pub approved: Option<bool>,
    pub sort: SortKey,
    pub page: usize,
    pub per_page: usize,
}

impl Default for NovelQuery {
    fn default() -> Self {
        Self {
            category: None,
            author: None,
            poster: None,
            status: None,
            bucket: ChapterBucket::Any,
            search: None,
            modvote: false,
            has_chapters: false,
            approved: None,
            sort: SortKey::Updated,
            page: 1,
            per_page: 20,
        }
    }
}

impl NovelQuery {
    /// Approved novels only.
    pub fn public() -> Self {
        Self {
            approved: Some(true),
            ..Self::default()
        }
    }

    /// Everything, including novels waiting for moderation.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn by_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn posted_by(mut self, poster: impl Into<String>) -> Self {
        self.poster = Some(poster.into());
        self
    }

    pub fn with_status(mut self, status: Option<NovelStatus>) -> Self {
        if status.is_some() {
            self.status = status;
        }
        self
    }

    pub fn with_bucket(mut self, bucket: ChapterBucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn searching(mut self, text: Option<&str>) -> Self {
        self.search = text.and_then(SearchText::new);
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn approved(mut self, approved: Option<bool>) -> Self {
        self.approved = approved;
        self
    }

    /// Page numbers start at 1; out-of-range values are clamped.
    pub fn paged(mut self, page: Option<usize>, per_page: usize) -> Self {
        self.page = page.unwrap_or(1).clamp(1, MAX_PAGE);
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    /// First `limit` results only.
    pub fn limited(self, limit: usize) -> Self {
        self.paged(Some(1), limit)
    }

    pub fn offset(&self) -> usize {
        page_offset(self.page, self.per_page)
    }

    pub fn matches(&self, novel: &Novel, stats: &NovelStats) -> bool {
        if self.category.as_ref().is_some_and(|c| *c != novel.category)
            || self.author.as_ref().is_some_and(|a| *a != novel.author)
            || self.poster.as_ref().is_some_and(|p| *p != novel.poster)
            || self.status.is_some_and(|s| s != novel.status)
            || self.approved.is_some_and(|a| a != novel.approved)
        {
            return false;
        }
        if self.modvote && !novel.modvote {
            return false;
        }
        if self.has_chapters && stats.chap_count == 0 {
            return false;
        }
        if !self.bucket.contains(stats.chap_count) {
            return false;
        }
        self.search
            .as_ref()
            .map_or(true, |s| s.matches(&novel.title, &novel.slug))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NovelPage {
    pub novels: Vec<NovelCard>,
    pub total: u64,
    pub page: usize,
    pub pages: u64,
}

impl NovelPage {
    pub fn new(novels: Vec<NovelCard>, total: u64, query: &NovelQuery) -> Self {
        let per_page = query.per_page.max(1) as u64;
        Self {
            novels,
            total,
            page: query.page,
            pages: total.div_ceil(per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NovelDraft;

    fn novel(title: &str) -> Novel {
        Novel::from_draft(NovelDraft {
            title: title.to_string(),
            slug: slugify(title),
            description: None,
            image: None,
            author: "author-1".into(),
            category: "cate-1".into(),
            poster: "user-1".into(),
            tags: vec![],
            status: NovelStatus::Continue,
            approved: true,
        })
        .unwrap()
    }

    fn card(novel: &Novel, stats: NovelStats) -> NovelCard {
        NovelCard::assemble(novel, None, None, vec![], stats)
    }

    #[test]
    fn buckets_split_at_documented_edges() {
        let b = ChapterBucket::from_query(Some(1));
        assert!(b.contains(0) && b.contains(99) && !b.contains(100));
        let b = ChapterBucket::from_query(Some(2));
        assert!(b.contains(100) && b.contains(500) && !b.contains(501));
        let b = ChapterBucket::from_query(Some(3));
        assert!(b.contains(501) && b.contains(1000) && !b.contains(1001));
        let b = ChapterBucket::from_query(Some(4));
        assert!(!b.contains(1000) && b.contains(1001));
        assert_eq!(ChapterBucket::from_query(Some(9)), ChapterBucket::Any);
        assert!(ChapterBucket::Any.contains(123_456));
    }

    #[test]
    fn sort_aliases() {
        assert_eq!(SortKey::from_query(Some("views")), Some(SortKey::Views));
        assert_eq!(SortKey::from_query(Some(" Rate ")), Some(SortKey::Rating));
        assert_eq!(SortKey::from_query(Some("bogus")), None);
        assert_eq!(SortKey::from_query(None), None);
    }

    #[test]
    fn ties_break_on_update_time_then_id() {
        let mut a = novel("A");
        let mut b = novel("B");
        a.views = 10;
        b.views = 10;
        b.updated_at = a.updated_at + chrono::Duration::seconds(5);
        let (ca, cb) = (card(&a, NovelStats::default()), card(&b, NovelStats::default()));
        assert_eq!(SortKey::Views.compare(&cb, &ca), Ordering::Less);

        b.updated_at = a.updated_at;
        let (ca, cb) = (card(&a, NovelStats::default()), card(&b, NovelStats::default()));
        let expected = a.id.cmp(&b.id);
        assert_eq!(SortKey::Views.compare(&ca, &cb), expected);
    }

    #[test]
    fn rating_sort_uses_rate_count_as_second_key() {
        let mut a = novel("A");
        let mut b = novel("B");
        a.scores = 4.5;
        a.rate_nums = 2;
        b.scores = 4.5;
        b.rate_nums = 10;
        let (ca, cb) = (card(&a, NovelStats::default()), card(&b, NovelStats::default()));
        assert_eq!(SortKey::Rating.compare(&cb, &ca), Ordering::Less);
    }

    #[test]
    fn title_sort_is_ascending() {
        let (a, b) = (novel("alpha"), novel("Beta"));
        let (ca, cb) = (card(&a, NovelStats::default()), card(&b, NovelStats::default()));
        assert_eq!(SortKey::Title.compare(&ca, &cb), Ordering::Less);
    }

    #[test]
    fn query_predicate_combines_filters() {
        let mut n = novel("Đấu Phá Thương Khung");
        n.status = NovelStatus::Completed;
        let stats = NovelStats {
            chap_count: 120,
            ..Default::default()
        };

        let q = NovelQuery::public()
            .in_category("cate-1")
            .with_status(Some(NovelStatus::Completed))
            .with_bucket(ChapterBucket::From100To500)
            .searching(Some("dau pha"));
        assert!(q.matches(&n, &stats));

        assert!(!q.clone().in_category("other").matches(&n, &stats));
        assert!(!q
            .clone()
            .with_bucket(ChapterBucket::Under100)
            .matches(&n, &stats));

        n.approved = false;
        assert!(!q.matches(&n, &stats));
    }

    #[test]
    fn search_matches_with_or_without_diacritics() {
        let s = SearchText::new("Phá").unwrap();
        assert!(s.matches("Đấu Phá Thương Khung", "dau-pha-thuong-khung"));
        let s = SearchText::new("thuong khung").unwrap();
        assert!(s.matches("Đấu Phá Thương Khung", "dau-pha-thuong-khung"));
        assert!(SearchText::new("   ").is_none());
    }

    #[test]
    fn turns_fix_their_own_filters() {
        let q = ListTurn::parse("completed")
            .unwrap()
            .apply(NovelQuery::public().with_status(Some(NovelStatus::Drop)));
        assert_eq!(q.status, Some(NovelStatus::Completed));
        let q = ListTurn::parse("hot").unwrap().apply(NovelQuery::public());
        assert!(q.modvote);
        assert!(ListTurn::parse("unknown").is_err());
    }

    #[test]
    fn paging_is_clamped() {
        let q = NovelQuery::public().paged(Some(0), 0);
        assert_eq!((q.page, q.per_page, q.offset()), (1, 1, 0));
        let q = NovelQuery::public().paged(Some(3), 1000);
        assert_eq!((q.per_page, q.offset()), (MAX_PER_PAGE, 200));

        let page = NovelPage::new(vec![], 41, &NovelQuery::public().paged(Some(2), 20));
        assert_eq!(page.pages, 3);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let q = NovelQuery::public().paged(Some(usize::MAX), MAX_PER_PAGE);
        assert_eq!(q.page, MAX_PAGE);
        assert_eq!(q.offset(), (MAX_PAGE - 1) * MAX_PER_PAGE);
        assert_eq!(page_offset(usize::MAX, usize::MAX), usize::MAX);
        assert_eq!(page_offset(0, 50), 0);
    }
}
