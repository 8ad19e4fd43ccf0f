//! The persistence seam. Services only talk to `dyn Store`.

use async_trait::async_trait;

use crate::listing::{NovelPage, NovelQuery};
use crate::models::*;
use crate::Result;

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    // users

    /// Fails with `Conflict` when the username or email is taken.
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn user_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>>;
    /// Newest first.
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn count_users(&self) -> Result<u64>;
    async fn update_user(&self, user: &User) -> Result<()>;
    /// Takes `amount` gold cards if the balance allows it and returns the new balance.
    async fn debit_goldcard(&self, user_id: &str, amount: u32) -> Result<u32>;
    async fn user_stats(&self, user_id: &str) -> Result<UserStats>;

    // authors

    async fn insert_author(&self, author: Author) -> Result<()>;
    async fn author_by_id(&self, id: &str) -> Result<Option<Author>>;
    async fn author_by_slug(&self, slug: &str) -> Result<Option<Author>>;
    async fn search_authors(&self, text: &str, limit: usize) -> Result<Vec<Author>>;
    /// Slugs equal to `base` or of the form `base-N`.
    async fn author_slugs_like(&self, base: &str) -> Result<Vec<String>>;
    async fn count_author_novels(&self, author_id: &str) -> Result<u64>;

    // categories

    async fn insert_category(&self, category: Category) -> Result<()>;
    async fn category_by_id(&self, id: &str) -> Result<Option<Category>>;
    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>>;
    /// Name ascending, with novel counts.
    async fn list_categories(&self) -> Result<Vec<CategoryView>>;
    async fn update_category(&self, category: &Category) -> Result<()>;
    async fn delete_category(&self, id: &str) -> Result<()>;
    async fn count_category_novels(&self, category_id: &str) -> Result<u64>;
    async fn reassign_novels(&self, from: &str, to: &str) -> Result<u64>;
    async fn delete_novels_in_category(&self, category_id: &str) -> Result<u64>;

    // tags

    /// Fails with `Conflict` when the name or slug is taken.
    async fn insert_tag(&self, tag: Tag) -> Result<()>;
    async fn tag_by_id(&self, id: &str) -> Result<Option<Tag>>;
    async fn tag_by_slug(&self, slug: &str) -> Result<Option<Tag>>;
    /// Name ascending.
    async fn list_tags(&self) -> Result<Vec<Tag>>;
    async fn update_tag(&self, tag: &Tag) -> Result<()>;
    /// Also removes the tag from every novel carrying it.
    async fn delete_tag(&self, id: &str) -> Result<()>;

    // novels

    async fn insert_novel(&self, novel: Novel) -> Result<()>;
    async fn novel_by_id(&self, id: &str) -> Result<Option<Novel>>;
    async fn novel_by_slug(&self, slug: &str) -> Result<Option<Novel>>;
    async fn novel_slugs_like(&self, base: &str) -> Result<Vec<String>>;
    async fn update_novel(&self, novel: &Novel) -> Result<()>;
    /// Removes the novel with its chapters, follows, ratings, comments,
    /// votes and notifications.
    async fn delete_novel(&self, id: &str) -> Result<()>;
    async fn list_novels(&self, query: &NovelQuery) -> Result<NovelPage>;
    async fn novel_card(&self, id: &str) -> Result<Option<NovelCard>>;
    async fn increment_views(&self, id: &str) -> Result<()>;
    async fn count_novels(&self, approved: Option<bool>) -> Result<u64>;

    // chapters

    /// Numbers the chapter after the novel's last one and bumps the novel's `updatedAt`.
    async fn insert_chap(&self, chap: Chap) -> Result<Chap>;
    /// One page of summaries in ascending order, plus the novel's chapter count.
    async fn chapter_page(&self, novel_id: &str, page: usize) -> Result<(Vec<ChapSummary>, u64)>;
    async fn all_chapters(&self, novel_id: &str) -> Result<Vec<ChapSummary>>;
    async fn chap_by_number(&self, novel_id: &str, chap: u32) -> Result<Option<Chap>>;

    // follows

    /// Returns the existing follow when there already is one.
    async fn insert_follow(&self, follow: Follow) -> Result<Follow>;
    async fn delete_follow(&self, novel_id: &str, follower: &str) -> Result<bool>;
    async fn follow_exists(&self, novel_id: &str, follower: &str) -> Result<bool>;
    async fn follower_ids(&self, novel_id: &str) -> Result<Vec<String>>;
    async fn followed_novels(&self, follower: &str) -> Result<Vec<FollowView>>;

    // ratings

    /// Records the rating and folds it into the novel's average. `Conflict`
    /// when the rater already rated this novel.
    async fn insert_rating(&self, rating: Rating) -> Result<Novel>;
    async fn rating_exists(&self, novel_id: &str, rater: &str) -> Result<bool>;
    async fn ratings_for_novel(&self, novel_id: &str) -> Result<Vec<RatingView>>;

    // votes

    /// Debits the voter and stores the vote; returns the voter's new balance.
    async fn insert_vote(&self, vote: Vote) -> Result<u32>;
    async fn votes_by_user(&self, voter: &str) -> Result<Vec<VoteView>>;

    // comments

    async fn insert_comment(&self, comment: Comment) -> Result<()>;
    async fn comment_by_id(&self, id: &str) -> Result<Option<Comment>>;
    /// Approved top-level comments, newest first.
    async fn root_comments(&self, novel_id: &str) -> Result<Vec<CommentView>>;
    /// Approved replies, oldest first.
    async fn replies(&self, parent_id: &str) -> Result<Vec<CommentView>>;
    async fn pending_comments(&self) -> Result<Vec<CommentView>>;
    async fn approve_comment(&self, id: &str) -> Result<Comment>;
    /// Deletes the comment and its replies; returns how many were removed.
    /// `NotFound` when the comment does not exist.
    async fn delete_comment(&self, id: &str) -> Result<u64>;

    // messages

    async fn insert_message(&self, message: Message) -> Result<()>;
    async fn messages_sent(&self, sender: &str) -> Result<Vec<MessageView>>;
    async fn messages_received(&self, reciever: &str) -> Result<Vec<MessageView>>;

    // notifications

    async fn insert_notifications(&self, notis: Vec<Notification>) -> Result<()>;
    async fn notification_feed(&self, user_id: &str) -> Result<NotificationFeed>;
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;
    /// Only the user's own notifications are touched.
    async fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<u64>;

    // settings

    async fn load_settings(&self) -> Result<Option<SiteSettings>>;
    async fn save_settings(&self, settings: &SiteSettings) -> Result<()>;
}

/// Keeps slugs equal to `base` or `base-<digits>`.
pub fn is_slug_variant(base: &str, candidate: &str) -> bool {
    match candidate.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_variants() {
        assert!(is_slug_variant("toan-chuc", "toan-chuc"));
        assert!(is_slug_variant("toan-chuc", "toan-chuc-12"));
        assert!(!is_slug_variant("toan-chuc", "toan-chuc-phap-su"));
        assert!(!is_slug_variant("toan-chuc", "toan"));
    }
}
