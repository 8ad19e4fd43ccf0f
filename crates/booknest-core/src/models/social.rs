use serde::{Deserialize, Serialize};

use super::{check_required, NovelBrief, NovelCard, UserBrief};
use crate::time::{iso_millis, new_id, now, Timestamp};
use crate::{BookNestError, Result};

pub const DEFAULT_RATING_CONTENT: &str = "this is my ratting";
pub const DEFAULT_VOTE_CONTENT: &str = "hãy nhận lấy kim phiếu của tôi";

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    /// Author of the comment.
    pub auth: String,
    pub novel: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "yes")]
    pub approved: bool,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Comment {
    pub fn new(
        auth: &str,
        novel: &str,
        parent: Option<String>,
        content: &str,
        approved: bool,
    ) -> Result<Self> {
        check_required("content", content)?;
        let ts = now();
        Ok(Self {
            id: new_id(),
            content: content.trim().to_string(),
            auth: auth.to_string(),
            novel: novel.to_string(),
            parent,
            approved,
            created_at: ts,
            updated_at: ts,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub auth: Option<UserBrief>,
    pub novel: String,
    pub parent: Option<String>,
    pub approved: bool,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
    #[serde(rename = "repCount")]
    pub rep_count: u64,
}

impl CommentView {
    pub fn assemble(comment: &Comment, auth: Option<UserBrief>, rep_count: u64) -> Self {
        Self {
            id: comment.id.clone(),
            content: comment.content.clone(),
            auth,
            novel: comment.novel.clone(),
            parent: comment.parent.clone(),
            approved: comment.approved,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            rep_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Follow {
    #[serde(rename = "_id")]
    pub id: String,
    pub novel: String,
    pub follower: String,
}

impl Follow {
    pub fn new(novel: &str, follower: &str) -> Self {
        Self {
            id: new_id(),
            novel: novel.to_string(),
            follower: follower.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FollowView {
    #[serde(rename = "_id")]
    pub id: String,
    pub follower: String,
    pub novel: NovelCard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id: String,
    pub rater: String,
    pub content: String,
    pub novel: String,
    pub scores: u8,
}

impl Rating {
    pub fn new(rater: &str, novel: &str, scores: u8, content: Option<String>) -> Result<Self> {
        if !(1..=5).contains(&scores) {
            return Err(BookNestError::validation("scores must be between 1 and 5"));
        }
        Ok(Self {
            id: new_id(),
            rater: rater.to_string(),
            content: content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RATING_CONTENT.to_string()),
            novel: novel.to_string(),
            scores,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingView {
    #[serde(rename = "_id")]
    pub id: String,
    pub rater: Option<UserBrief>,
    pub content: String,
    pub novel: String,
    pub scores: u8,
}

impl RatingView {
    pub fn assemble(rating: &Rating, rater: Option<UserBrief>) -> Self {
        Self {
            id: rating.id.clone(),
            rater,
            content: rating.content.clone(),
            novel: rating.novel.clone(),
            scores: rating.scores,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: String,
    pub novel: String,
    pub voter: String,
    pub content: String,
    pub goldcard: u32,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Vote {
    pub fn new(novel: &str, voter: &str, goldcard: u32, content: Option<String>) -> Result<Self> {
        if goldcard == 0 {
            return Err(BookNestError::validation("goldcard must be at least 1"));
        }
        let ts = now();
        Ok(Self {
            id: new_id(),
            novel: novel.to_string(),
            voter: voter.to_string(),
            content: content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_VOTE_CONTENT.to_string()),
            goldcard,
            created_at: ts,
            updated_at: ts,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteView {
    #[serde(rename = "_id")]
    pub id: String,
    pub novel: Option<NovelBrief>,
    pub voter: String,
    pub content: String,
    pub goldcard: u32,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
}

impl VoteView {
    pub fn assemble(vote: &Vote, novel: Option<NovelBrief>) -> Self {
        Self {
            id: vote.id.clone(),
            novel,
            voter: vote.voter.clone(),
            content: vote.content.clone(),
            goldcard: vote.goldcard,
            created_at: vote.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_scores_are_bounded() {
        assert!(Rating::new("u", "n", 0, None).is_err());
        assert!(Rating::new("u", "n", 6, None).is_err());
        let rating = Rating::new("u", "n", 5, Some(" ".into())).unwrap();
        assert_eq!(rating.content, DEFAULT_RATING_CONTENT);
    }

    #[test]
    fn votes_need_a_positive_amount() {
        assert!(Vote::new("n", "u", 0, None).is_err());
        assert_eq!(Vote::new("n", "u", 3, None).unwrap().content, DEFAULT_VOTE_CONTENT);
    }

    #[test]
    fn empty_comments_are_rejected() {
        assert!(Comment::new("u", "n", None, "   ", true).is_err());
    }
}
