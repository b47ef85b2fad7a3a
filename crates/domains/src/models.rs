//! # Domain Models
//!
//! These structs represent the core entities: articles, comments and likes.
//! Parents advertise their children through id sets (`comments`, `likes`);
//! children point back through a [`ContentTarget`]. Neither side embeds the
//! other, so every reference is addressed by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArticleId, CommentId, ContentTarget, LikeId, UserId};
use crate::slug::slugify;

/// A published article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub author: UserId,
    pub title: String,
    /// URL-friendly, unique across all articles; derived from `title`.
    pub slug: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    /// Ordered set of comments attached to this article (replies included).
    pub comments: Vec<CommentId>,
    pub likes: Vec<LikeId>,
}

impl Article {
    pub fn new(author: UserId, title: impl Into<String>, body: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: ArticleId::generate(),
            author,
            slug: slugify(&title),
            title,
            body: body.into(),
            published_at: Utc::now(),
            comments: Vec::new(),
            likes: Vec::new(),
        }
    }
}

/// A comment attached to an article or to another comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub target: ContentTarget,
    pub body: String,
    pub posted_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub likes: Vec<LikeId>,
    /// Set when this comment is a reply; the parent shares `target`.
    pub parent: Option<CommentId>,
}

impl Comment {
    pub fn new(
        author: UserId,
        target: ContentTarget,
        body: impl Into<String>,
        parent: Option<CommentId>,
    ) -> Self {
        Self {
            id: CommentId::generate(),
            author,
            target,
            body: body.into(),
            posted_at: Utc::now(),
            edited_at: None,
            likes: Vec::new(),
            parent,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent.is_some()
    }
}

/// A signed vote on an article or comment. Always a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub voter: UserId,
    pub target: ContentTarget,
    pub value: Vote,
    pub liked_at: DateTime<Utc>,
}

impl Like {
    pub fn new(voter: UserId, target: ContentTarget, value: Vote) -> Self {
        Self {
            id: LikeId::generate(),
            voter,
            target,
            value,
            liked_at: Utc::now(),
        }
    }
}

/// Vote direction, stored as `+1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    pub fn value(&self) -> i64 {
        match self {
            Vote::Up => 1,
            Vote::Down => -1,
        }
    }
}

impl TryFrom<i64> for Vote {
    type Error = InvalidVote;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Vote::Up),
            -1 => Ok(Vote::Down),
            other => Err(InvalidVote(other)),
        }
    }
}

impl From<Vote> for i64 {
    fn from(vote: Vote) -> Self {
        vote.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("vote value must be +1 or -1, got {0}")]
pub struct InvalidVote(pub i64);

/// A child id held in one of a parent's back-reference sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackReference {
    /// Lives in `Article::comments`.
    Comment(CommentId),
    /// Lives in `Article::likes` or `Comment::likes`.
    Like(LikeId),
}

impl From<CommentId> for BackReference {
    fn from(id: CommentId) -> Self {
        BackReference::Comment(id)
    }
}

impl From<LikeId> for BackReference {
    fn from(id: LikeId) -> Self {
        BackReference::Like(id)
    }
}

/// Read model: an article with its likes and its comments, in
/// back-reference order, each with its own likes.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleThread {
    pub article: Article,
    pub likes: Vec<Like>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub comment: Comment,
    pub likes: Vec<Like>,
}

impl ArticleThread {
    /// Net score of the article's own likes.
    pub fn score(&self) -> i64 {
        self.likes.iter().map(|like| like.value.value()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_article_derives_slug_from_title() {
        let article = Article::new(UserId::generate(), "Hello Rust World", "body");
        assert_eq!(article.slug, "hello-rust-world");
        assert!(article.comments.is_empty());
        assert!(article.likes.is_empty());
    }

    #[test]
    fn vote_rejects_values_other_than_unit() {
        assert_eq!(Vote::try_from(1), Ok(Vote::Up));
        assert_eq!(Vote::try_from(-1), Ok(Vote::Down));
        assert_eq!(Vote::try_from(2), Err(InvalidVote(2)));
    }

    #[test]
    fn vote_serializes_as_signed_integer() {
        let json = serde_json::to_string(&Vote::Down).unwrap();
        assert_eq!(json, "-1");
        let vote: Vote = serde_json::from_str("1").unwrap();
        assert_eq!(vote, Vote::Up);
    }

    #[test]
    fn reply_knows_its_parent() {
        let article = ArticleId::generate();
        let parent = Comment::new(UserId::generate(), article.into(), "first", None);
        let reply = Comment::new(UserId::generate(), article.into(), "second", Some(parent.id));
        assert!(!parent.is_reply());
        assert!(reply.is_reply());
    }
}
