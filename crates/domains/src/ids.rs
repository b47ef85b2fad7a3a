//! # Identifiers and Content Targets
//!
//! Every entity is addressed by a typed id wrapping a UUID v7, so ids sort
//! in creation order. Comments and likes point at content through
//! [`ContentTarget`], a tagged variant rather than an untyped foreign key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Allocates a fresh, time-ordered id.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifies an article.
    ArticleId
);
entity_id!(
    /// Identifies a comment, top-level or reply.
    CommentId
);
entity_id!(
    /// Identifies a single vote.
    LikeId
);
entity_id!(
    /// Opaque caller identity handed over by the authentication layer.
    UserId
);

/// The discriminator of a [`ContentTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Article,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "Article",
            ContentType::Comment => "Comment",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Article" => Ok(ContentType::Article),
            "Comment" => Ok(ContentType::Comment),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// Returned when a stored or submitted content type tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content type: {0}")]
pub struct UnknownContentType(pub String);

/// The `(targetId, contentType)` pair a comment or like is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "contentType", content = "targetId")]
pub enum ContentTarget {
    Article(ArticleId),
    Comment(CommentId),
}

impl ContentTarget {
    /// Rebuilds a target from its stored parts.
    pub fn from_parts(content_type: ContentType, target_id: Uuid) -> Self {
        match content_type {
            ContentType::Article => ContentTarget::Article(ArticleId(target_id)),
            ContentType::Comment => ContentTarget::Comment(CommentId(target_id)),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            ContentTarget::Article(_) => ContentType::Article,
            ContentTarget::Comment(_) => ContentType::Comment,
        }
    }

    pub fn target_id(&self) -> Uuid {
        match self {
            ContentTarget::Article(id) => id.0,
            ContentTarget::Comment(id) => id.0,
        }
    }
}

impl From<ArticleId> for ContentTarget {
    fn from(id: ArticleId) -> Self {
        ContentTarget::Article(id)
    }
}

impl From<CommentId> for ContentTarget {
    fn from(id: CommentId) -> Self {
        ContentTarget::Comment(id)
    }
}

impl fmt::Display for ContentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type(), self.target_id())
    }
}
