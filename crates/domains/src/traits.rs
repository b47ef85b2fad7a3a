//! # Core Traits (Ports)
//!
//! Any storage adapter must implement [`ContentStore`] to be used by the
//! services.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::ids::{ArticleId, CommentId, ContentTarget, LikeId, UserId};
use crate::models::{Article, Comment, Like};

/// Persistence contract for articles, comments and likes.
///
/// Every data method runs inside the transaction handle it is given, and reads
/// observe the writes already made through that handle. A handle that is
/// dropped without [`ContentStore::commit`] must leave no trace in the store.
///
/// Adapters enforce two uniqueness constraints and report them as
/// `StoreError::UniqueViolation`: one slug per article, and one like per
/// `(voter, target id)` pair.
#[cfg_attr(any(test, feature = "testing"), mockall::automock(type Tx = ();))]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Transaction handle threaded through every call of one unit of work.
    type Tx: Send;

    // Transaction lifecycle
    async fn begin(&self) -> StoreResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;

    /// Whether the article or comment named by `target` currently exists.
    async fn exists(&self, tx: &mut Self::Tx, target: ContentTarget) -> StoreResult<bool>;

    // Article Operations
    async fn insert_article(&self, tx: &mut Self::Tx, article: &Article) -> StoreResult<()>;
    async fn find_article(&self, tx: &mut Self::Tx, id: ArticleId) -> StoreResult<Option<Article>>;
    async fn find_article_by_slug(&self, tx: &mut Self::Tx, slug: &str) -> StoreResult<Option<Article>>;
    /// All articles, newest first.
    async fn list_articles(&self, tx: &mut Self::Tx) -> StoreResult<Vec<Article>>;
    /// Replaces the stored row; `false` when the article does not exist.
    async fn update_article(&self, tx: &mut Self::Tx, article: &Article) -> StoreResult<bool>;
    /// `false` when there was nothing to delete.
    async fn delete_article(&self, tx: &mut Self::Tx, id: ArticleId) -> StoreResult<bool>;

    // Comment Operations
    async fn insert_comment(&self, tx: &mut Self::Tx, comment: &Comment) -> StoreResult<()>;
    async fn find_comment(&self, tx: &mut Self::Tx, id: CommentId) -> StoreResult<Option<Comment>>;
    async fn update_comment(&self, tx: &mut Self::Tx, comment: &Comment) -> StoreResult<bool>;
    async fn delete_comment(&self, tx: &mut Self::Tx, id: CommentId) -> StoreResult<bool>;
    /// Comments whose content target is `target`, oldest first.
    async fn comments_by_target(&self, tx: &mut Self::Tx, target: ContentTarget) -> StoreResult<Vec<Comment>>;
    /// Direct replies of `parent`, oldest first.
    async fn replies_to(&self, tx: &mut Self::Tx, parent: CommentId) -> StoreResult<Vec<Comment>>;

    // Like Operations
    async fn insert_like(&self, tx: &mut Self::Tx, like: &Like) -> StoreResult<()>;
    async fn find_like(&self, tx: &mut Self::Tx, id: LikeId) -> StoreResult<Option<Like>>;
    async fn find_like_by_voter(
        &self,
        tx: &mut Self::Tx,
        voter: UserId,
        target: ContentTarget,
    ) -> StoreResult<Option<Like>>;
    async fn delete_like(&self, tx: &mut Self::Tx, id: LikeId) -> StoreResult<bool>;
    async fn likes_by_target(&self, tx: &mut Self::Tx, target: ContentTarget) -> StoreResult<Vec<Like>>;
}
