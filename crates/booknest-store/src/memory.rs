//! In-process store used for development and tests.
//!
//! Every collection lives behind one `RwLock`, so each operation is a single
//! unit of work. Collections are insertion-ordered vectors; "newest first"
//! means reverse insertion order.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use booknest_core::listing::{page_offset, NovelPage, NovelQuery};
use booknest_core::models::*;
use booknest_core::store::{is_slug_variant, Store};
use booknest_core::time::now;
use booknest_core::{BookNestError, Result};
use parking_lot::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    authors: Vec<Author>,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    novels: Vec<Novel>,
    chaps: Vec<Chap>,
    follows: Vec<Follow>,
    ratings: Vec<Rating>,
    votes: Vec<Vote>,
    comments: Vec<Comment>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    settings: Option<SiteSettings>,
}

impl Tables {
    fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn novel(&self, id: &str) -> Option<&Novel> {
        self.novels.iter().find(|n| n.id == id)
    }

    fn novel_mut(&mut self, id: &str) -> Result<&mut Novel> {
        self.novels
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| BookNestError::not_found("Novel"))
    }

    fn user_brief(&self, id: &str) -> Option<UserBrief> {
        self.user(id).map(UserBrief::from)
    }

    fn novel_brief(&self, id: &str) -> Option<NovelBrief> {
        self.novel(id).map(NovelBrief::from)
    }

    fn stats_for(&self, novel_id: &str) -> NovelStats {
        NovelStats {
            chap_count: self.chaps.iter().filter(|c| c.novel == novel_id).count() as u64,
            follow_count: self.follows.iter().filter(|f| f.novel == novel_id).count() as u64,
            vote_count: self
                .votes
                .iter()
                .filter(|v| v.novel == novel_id)
                .map(|v| u64::from(v.goldcard))
                .sum(),
        }
    }

    /// Aggregates for every novel in one pass over the related collections.
    fn all_stats(&self) -> HashMap<&str, NovelStats> {
        let mut stats: HashMap<&str, NovelStats> = HashMap::new();
        for chap in &self.chaps {
            stats.entry(chap.novel.as_str()).or_default().chap_count += 1;
        }
        for follow in &self.follows {
            stats.entry(follow.novel.as_str()).or_default().follow_count += 1;
        }
        for vote in &self.votes {
            stats.entry(vote.novel.as_str()).or_default().vote_count += u64::from(vote.goldcard);
        }
        stats
    }

    fn card(&self, novel: &Novel, stats: NovelStats) -> NovelCard {
        let author = self
            .authors
            .iter()
            .find(|a| a.id == novel.author)
            .map(AuthorBrief::from);
        let category = self
            .categories
            .iter()
            .find(|c| c.id == novel.category)
            .map(CategoryBrief::from);
        let tags = novel
            .tags
            .iter()
            .filter_map(|id| self.tags.iter().find(|t| t.id == *id))
            .map(TagBrief::from)
            .collect();
        NovelCard::assemble(novel, author, category, tags, stats)
    }

    fn comment_view(&self, comment: &Comment) -> CommentView {
        let rep_count = self
            .comments
            .iter()
            .filter(|c| c.approved && c.parent.as_deref() == Some(comment.id.as_str()))
            .count() as u64;
        CommentView::assemble(comment, self.user_brief(&comment.auth), rep_count)
    }

    fn message_view(&self, message: &Message) -> MessageView {
        let reciever = message
            .reciever
            .iter()
            .filter_map(|id| self.user_brief(id))
            .collect();
        MessageView::assemble(message, self.user_brief(&message.sender), reciever)
    }

    fn remove_novel(&mut self, id: &str) -> bool {
        let before = self.novels.len();
        self.novels.retain(|n| n.id != id);
        if self.novels.len() == before {
            return false;
        }
        self.chaps.retain(|c| c.novel != id);
        self.follows.retain(|f| f.novel != id);
        self.ratings.retain(|r| r.novel != id);
        self.comments.retain(|c| c.novel != id);
        self.votes.retain(|v| v.novel != id);
        self.notifications
            .retain(|n| n.novel.as_deref() != Some(id));
        true
    }

    fn novel_count_where<F: Fn(&Novel) -> bool>(&self, pred: F) -> u64 {
        self.novels.iter().filter(|n| pred(n)).count() as u64
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut t = self.tables.write();
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(BookNestError::conflict("Username already exists"));
        }
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(BookNestError::conflict("Email already exists"));
        }
        debug!(user_id = %user.id, "inserting user");
        t.users.push(user);
        Ok(())
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().user(id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let t = self.tables.read();
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let t = self.tables.read();
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let t = self.tables.read();
        Ok(ids.iter().filter_map(|id| t.user(id).cloned()).collect())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().users.iter().rev().cloned().collect())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.tables.read().users.len() as u64)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write();
        let slot = t
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| BookNestError::not_found("User"))?;
        *slot = user.clone();
        Ok(())
    }

    async fn debit_goldcard(&self, user_id: &str, amount: u32) -> Result<u32> {
        let mut t = self.tables.write();
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| BookNestError::not_found("User"))?;
        if user.goldcard < amount {
            return Err(BookNestError::InsufficientBalance);
        }
        user.goldcard -= amount;
        user.updated_at = now();
        Ok(user.goldcard)
    }

    async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let t = self.tables.read();
        Ok(UserStats {
            chap_count: t.chaps.iter().filter(|c| c.poster == user_id).count() as u64,
            posted: t.novel_count_where(|n| n.poster == user_id),
            followed: t.follows.iter().filter(|f| f.follower == user_id).count() as u64,
        })
    }

    async fn insert_author(&self, author: Author) -> Result<()> {
        let mut t = self.tables.write();
        if t.authors.iter().any(|a| a.slug == author.slug) {
            return Err(BookNestError::conflict("Author already exists"));
        }
        t.authors.push(author);
        Ok(())
    }

    async fn author_by_id(&self, id: &str) -> Result<Option<Author>> {
        let t = self.tables.read();
        Ok(t.authors.iter().find(|a| a.id == id).cloned())
    }

    async fn author_by_slug(&self, slug: &str) -> Result<Option<Author>> {
        let t = self.tables.read();
        Ok(t.authors.iter().find(|a| a.slug == slug).cloned())
    }

    async fn search_authors(&self, text: &str, limit: usize) -> Result<Vec<Author>> {
        let Some(search) = booknest_core::listing::SearchText::new(text) else {
            return Ok(Vec::new());
        };
        let t = self.tables.read();
        let mut found: Vec<Author> = t
            .authors
            .iter()
            .filter(|a| search.matches(&a.name, &a.slug))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.name.to_lowercase());
        found.truncate(limit);
        Ok(found)
    }

    async fn author_slugs_like(&self, base: &str) -> Result<Vec<String>> {
        let t = self.tables.read();
        Ok(t.authors
            .iter()
            .filter(|a| is_slug_variant(base, &a.slug))
            .map(|a| a.slug.clone())
            .collect())
    }

    async fn count_author_novels(&self, author_id: &str) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.novel_count_where(|n| n.author == author_id && n.approved))
    }

    async fn insert_category(&self, category: Category) -> Result<()> {
        let mut t = self.tables.write();
        if t.categories.iter().any(|c| c.slug == category.slug) {
            return Err(BookNestError::conflict("Category already exists"));
        }
        t.categories.push(category);
        Ok(())
    }

    async fn category_by_id(&self, id: &str) -> Result<Option<Category>> {
        let t = self.tables.read();
        Ok(t.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let t = self.tables.read();
        Ok(t.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<CategoryView>> {
        let t = self.tables.read();
        let mut views: Vec<CategoryView> = t
            .categories
            .iter()
            .map(|c| CategoryView {
                category: c.clone(),
                novel_count: t.novel_count_where(|n| n.category == c.id && n.approved),
            })
            .collect();
        views.sort_by_key(|v| v.category.cate.to_lowercase());
        Ok(views)
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        let mut t = self.tables.write();
        if t
            .categories
            .iter()
            .any(|c| c.slug == category.slug && c.id != category.id)
        {
            return Err(BookNestError::conflict("Category already exists"));
        }
        let slot = t
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| BookNestError::not_found("Category"))?;
        *slot = category.clone();
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        let mut t = self.tables.write();
        let before = t.categories.len();
        t.categories.retain(|c| c.id != id);
        if t.categories.len() == before {
            return Err(BookNestError::not_found("Category"));
        }
        Ok(())
    }

    async fn count_category_novels(&self, category_id: &str) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.novel_count_where(|n| n.category == category_id))
    }

    async fn reassign_novels(&self, from: &str, to: &str) -> Result<u64> {
        let mut t = self.tables.write();
        let mut moved = 0;
        for novel in t.novels.iter_mut().filter(|n| n.category == from) {
            novel.category = to.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    async fn delete_novels_in_category(&self, category_id: &str) -> Result<u64> {
        let mut t = self.tables.write();
        let ids: Vec<String> = t
            .novels
            .iter()
            .filter(|n| n.category == category_id)
            .map(|n| n.id.clone())
            .collect();
        for id in &ids {
            t.remove_novel(id);
        }
        Ok(ids.len() as u64)
    }

    async fn insert_tag(&self, tag: Tag) -> Result<()> {
        let mut t = self.tables.write();
        let name = tag.name.to_lowercase();
        if t
            .tags
            .iter()
            .any(|existing| existing.slug == tag.slug || existing.name.to_lowercase() == name)
        {
            return Err(BookNestError::conflict("Tag with this name already exists"));
        }
        t.tags.push(tag);
        Ok(())
    }

    async fn tag_by_id(&self, id: &str) -> Result<Option<Tag>> {
        let t = self.tables.read();
        Ok(t.tags.iter().find(|tag| tag.id == id).cloned())
    }

    async fn tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let t = self.tables.read();
        Ok(t.tags.iter().find(|tag| tag.slug == slug).cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut tags = self.tables.read().tags.clone();
        tags.sort_by_key(|tag| tag.name.to_lowercase());
        Ok(tags)
    }

    async fn update_tag(&self, tag: &Tag) -> Result<()> {
        let mut t = self.tables.write();
        if t
            .tags
            .iter()
            .any(|other| other.id != tag.id && other.slug == tag.slug)
        {
            return Err(BookNestError::conflict("Tag with this name already exists"));
        }
        let slot = t
            .tags
            .iter_mut()
            .find(|other| other.id == tag.id)
            .ok_or_else(|| BookNestError::not_found("Tag"))?;
        *slot = tag.clone();
        Ok(())
    }

    async fn delete_tag(&self, id: &str) -> Result<()> {
        let mut t = self.tables.write();
        let before = t.tags.len();
        t.tags.retain(|tag| tag.id != id);
        if t.tags.len() == before {
            return Err(BookNestError::not_found("Tag"));
        }
        for novel in t.novels.iter_mut() {
            novel.tags.retain(|tag| tag != id);
        }
        Ok(())
    }

    async fn insert_novel(&self, novel: Novel) -> Result<()> {
        let mut t = self.tables.write();
        if t.novels.iter().any(|n| n.slug == novel.slug) {
            return Err(BookNestError::conflict("A novel with this slug already exists"));
        }
        debug!(novel = %novel.slug, "inserting novel");
        t.novels.push(novel);
        Ok(())
    }

    async fn novel_by_id(&self, id: &str) -> Result<Option<Novel>> {
        Ok(self.tables.read().novel(id).cloned())
    }

    async fn novel_by_slug(&self, slug: &str) -> Result<Option<Novel>> {
        let t = self.tables.read();
        Ok(t.novels.iter().find(|n| n.slug == slug).cloned())
    }

    async fn novel_slugs_like(&self, base: &str) -> Result<Vec<String>> {
        let t = self.tables.read();
        Ok(t.novels
            .iter()
            .filter(|n| is_slug_variant(base, &n.slug))
            .map(|n| n.slug.clone())
            .collect())
    }

    async fn update_novel(&self, novel: &Novel) -> Result<()> {
        let mut t = self.tables.write();
        if t
            .novels
            .iter()
            .any(|n| n.id != novel.id && n.slug == novel.slug)
        {
            return Err(BookNestError::conflict("A novel with this slug already exists"));
        }
        let slot = t.novel_mut(&novel.id)?;
        *slot = novel.clone();
        Ok(())
    }

    async fn delete_novel(&self, id: &str) -> Result<()> {
        let mut t = self.tables.write();
        if !t.remove_novel(id) {
            return Err(BookNestError::not_found("Novel"));
        }
        debug!(novel_id = %id, "novel deleted with its related documents");
        Ok(())
    }

    async fn list_novels(&self, query: &NovelQuery) -> Result<NovelPage> {
        let t = self.tables.read();
        let stats = t.all_stats();
        let mut cards: Vec<NovelCard> = t
            .novels
            .iter()
            .filter_map(|novel| {
                let s = stats.get(novel.id.as_str()).copied().unwrap_or_default();
                query.matches(novel, &s).then(|| t.card(novel, s))
            })
            .collect();
        cards.sort_by(|a, b| query.sort.compare(a, b));
        let total = cards.len() as u64;
        let novels = cards
            .into_iter()
            .skip(query.offset())
            .take(query.per_page)
            .collect();
        Ok(NovelPage::new(novels, total, query))
    }

    async fn novel_card(&self, id: &str) -> Result<Option<NovelCard>> {
        let t = self.tables.read();
        Ok(t.novel(id).map(|n| t.card(n, t.stats_for(&n.id))))
    }

    async fn increment_views(&self, id: &str) -> Result<()> {
        let mut t = self.tables.write();
        t.novel_mut(id)?.views += 1;
        Ok(())
    }

    async fn count_novels(&self, approved: Option<bool>) -> Result<u64> {
        let t = self.tables.read();
        Ok(t.novel_count_where(|n| approved.map_or(true, |a| n.approved == a)))
    }

    async fn insert_chap(&self, mut chap: Chap) -> Result<Chap> {
        let mut t = self.tables.write();
        let ts = now();
        t.novel_mut(&chap.novel)?.updated_at = ts;
        let last = t
            .chaps
            .iter()
            .filter(|c| c.novel == chap.novel)
            .map(|c| c.chap)
            .max()
            .unwrap_or(0);
        chap.chap = last + 1;
        t.chaps.push(chap.clone());
        Ok(chap)
    }

    async fn chapter_page(&self, novel_id: &str, page: usize) -> Result<(Vec<ChapSummary>, u64)> {
        let all = self.all_chapters(novel_id).await?;
        let total = all.len() as u64;
        let skip = page_offset(page, CHAPTERS_PER_PAGE);
        let items = all.into_iter().skip(skip).take(CHAPTERS_PER_PAGE).collect();
        Ok((items, total))
    }

    async fn all_chapters(&self, novel_id: &str) -> Result<Vec<ChapSummary>> {
        let t = self.tables.read();
        let mut chaps: Vec<ChapSummary> = t
            .chaps
            .iter()
            .filter(|c| c.novel == novel_id)
            .map(ChapSummary::from)
            .collect();
        chaps.sort_by_key(|c| c.chap);
        Ok(chaps)
    }

    async fn chap_by_number(&self, novel_id: &str, chap: u32) -> Result<Option<Chap>> {
        let t = self.tables.read();
        Ok(t.chaps
            .iter()
            .find(|c| c.novel == novel_id && c.chap == chap)
            .cloned())
    }

    async fn insert_follow(&self, follow: Follow) -> Result<Follow> {
        let mut t = self.tables.write();
        if let Some(existing) = t
            .follows
            .iter()
            .find(|f| f.novel == follow.novel && f.follower == follow.follower)
        {
            return Ok(existing.clone());
        }
        t.follows.push(follow.clone());
        Ok(follow)
    }

    async fn delete_follow(&self, novel_id: &str, follower: &str) -> Result<bool> {
        let mut t = self.tables.write();
        let before = t.follows.len();
        t.follows
            .retain(|f| !(f.novel == novel_id && f.follower == follower));
        Ok(t.follows.len() != before)
    }

    async fn follow_exists(&self, novel_id: &str, follower: &str) -> Result<bool> {
        let t = self.tables.read();
        Ok(t.follows
            .iter()
            .any(|f| f.novel == novel_id && f.follower == follower))
    }

    async fn follower_ids(&self, novel_id: &str) -> Result<Vec<String>> {
        let t = self.tables.read();
        Ok(t.follows
            .iter()
            .filter(|f| f.novel == novel_id)
            .map(|f| f.follower.clone())
            .collect())
    }

    async fn followed_novels(&self, follower: &str) -> Result<Vec<FollowView>> {
        let t = self.tables.read();
        let mut views: Vec<FollowView> = t
            .follows
            .iter()
            .filter(|f| f.follower == follower)
            .filter_map(|f| {
                t.novel(&f.novel).map(|n| FollowView {
                    id: f.id.clone(),
                    follower: f.follower.clone(),
                    novel: t.card(n, t.stats_for(&n.id)),
                })
            })
            .collect();
        views.sort_by(|a, b| b.novel.updated_at.cmp(&a.novel.updated_at));
        Ok(views)
    }

    async fn insert_rating(&self, rating: Rating) -> Result<Novel> {
        let mut t = self.tables.write();
        if t
            .ratings
            .iter()
            .any(|r| r.novel == rating.novel && r.rater == rating.rater)
        {
            return Err(BookNestError::conflict("User has already rated this novel"));
        }
        let novel = t.novel_mut(&rating.novel)?;
        novel.apply_rating(rating.scores);
        let updated = novel.clone();
        t.ratings.push(rating);
        Ok(updated)
    }

    async fn rating_exists(&self, novel_id: &str, rater: &str) -> Result<bool> {
        let t = self.tables.read();
        Ok(t.ratings
            .iter()
            .any(|r| r.novel == novel_id && r.rater == rater))
    }

    async fn ratings_for_novel(&self, novel_id: &str) -> Result<Vec<RatingView>> {
        let t = self.tables.read();
        Ok(t.ratings
            .iter()
            .rev()
            .filter(|r| r.novel == novel_id)
            .map(|r| RatingView::assemble(r, t.user_brief(&r.rater)))
            .collect())
    }

    async fn insert_vote(&self, vote: Vote) -> Result<u32> {
        let mut t = self.tables.write();
        if t.novel(&vote.novel).is_none() {
            return Err(BookNestError::not_found("Novel"));
        }
        let voter = t
            .users
            .iter_mut()
            .find(|u| u.id == vote.voter)
            .ok_or_else(|| BookNestError::not_found("User"))?;
        if voter.goldcard < vote.goldcard {
            return Err(BookNestError::InsufficientBalance);
        }
        voter.goldcard -= vote.goldcard;
        voter.updated_at = now();
        let balance = voter.goldcard;
        t.votes.push(vote);
        Ok(balance)
    }

    async fn votes_by_user(&self, voter: &str) -> Result<Vec<VoteView>> {
        let t = self.tables.read();
        Ok(t.votes
            .iter()
            .rev()
            .filter(|v| v.voter == voter)
            .map(|v| VoteView::assemble(v, t.novel_brief(&v.novel)))
            .collect())
    }

    async fn insert_comment(&self, comment: Comment) -> Result<()> {
        self.tables.write().comments.push(comment);
        Ok(())
    }

    async fn comment_by_id(&self, id: &str) -> Result<Option<Comment>> {
        let t = self.tables.read();
        Ok(t.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn root_comments(&self, novel_id: &str) -> Result<Vec<CommentView>> {
        let t = self.tables.read();
        Ok(t.comments
            .iter()
            .rev()
            .filter(|c| c.novel == novel_id && c.parent.is_none() && c.approved)
            .map(|c| t.comment_view(c))
            .collect())
    }

    async fn replies(&self, parent_id: &str) -> Result<Vec<CommentView>> {
        let t = self.tables.read();
        Ok(t.comments
            .iter()
            .filter(|c| c.parent.as_deref() == Some(parent_id) && c.approved)
            .map(|c| t.comment_view(c))
            .collect())
    }

    async fn pending_comments(&self) -> Result<Vec<CommentView>> {
        let t = self.tables.read();
        Ok(t.comments
            .iter()
            .filter(|c| !c.approved)
            .map(|c| t.comment_view(c))
            .collect())
    }

    async fn approve_comment(&self, id: &str) -> Result<Comment> {
        let mut t = self.tables.write();
        let comment = t
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BookNestError::not_found("Comment"))?;
        comment.approved = true;
        comment.updated_at = now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: &str) -> Result<u64> {
        let mut t = self.tables.write();
        if !t.comments.iter().any(|c| c.id == id) {
            return Err(BookNestError::not_found("Comment"));
        }
        let mut doomed: HashSet<String> = HashSet::from([id.to_string()]);
        loop {
            let more: Vec<String> = t
                .comments
                .iter()
                .filter(|c| {
                    !doomed.contains(&c.id)
                        && c.parent.as_ref().is_some_and(|p| doomed.contains(p))
                })
                .map(|c| c.id.clone())
                .collect();
            if more.is_empty() {
                break;
            }
            doomed.extend(more);
        }
        t.comments.retain(|c| !doomed.contains(&c.id));
        Ok(doomed.len() as u64)
    }

    async fn insert_message(&self, message: Message) -> Result<()> {
        self.tables.write().messages.push(message);
        Ok(())
    }

    async fn messages_sent(&self, sender: &str) -> Result<Vec<MessageView>> {
        let t = self.tables.read();
        Ok(t.messages
            .iter()
            .rev()
            .filter(|m| m.sender == sender)
            .map(|m| t.message_view(m))
            .collect())
    }

    async fn messages_received(&self, reciever: &str) -> Result<Vec<MessageView>> {
        let t = self.tables.read();
        Ok(t.messages
            .iter()
            .rev()
            .filter(|m| m.reciever.iter().any(|r| r == reciever))
            .map(|m| t.message_view(m))
            .collect())
    }

    async fn insert_notifications(&self, notis: Vec<Notification>) -> Result<()> {
        self.tables.write().notifications.extend(notis);
        Ok(())
    }

    async fn notification_feed(&self, user_id: &str) -> Result<NotificationFeed> {
        let t = self.tables.read();
        let notis = t
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user == user_id)
            .take(NOTIFICATIONS_PAGE)
            .map(|n| {
                NotificationView::assemble(
                    n,
                    n.novel.as_deref().and_then(|id| t.novel_brief(id)),
                    n.sender.as_deref().and_then(|id| t.user_brief(id)),
                )
            })
            .collect();
        let count = t
            .notifications
            .iter()
            .filter(|n| n.user == user_id && !n.read)
            .count() as u64;
        Ok(NotificationFeed { notis, count })
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let mut t = self.tables.write();
        let mut changed = 0;
        for noti in t
            .notifications
            .iter_mut()
            .filter(|n| n.user == user_id && !n.read)
        {
            noti.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        let mut t = self.tables.write();
        let mut changed = 0;
        for noti in t
            .notifications
            .iter_mut()
            .filter(|n| n.user == user_id && !n.read && ids.contains(&n.id))
        {
            noti.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn load_settings(&self) -> Result<Option<SiteSettings>> {
        Ok(self.tables.read().settings.clone())
    }

    async fn save_settings(&self, settings: &SiteSettings) -> Result<()> {
        self.tables.write().settings = Some(settings.clone());
        Ok(())
    }
}
