//! Comment creation, editing and cascading removal.

use chrono::Utc;
use domains::{
    BackReference, Comment, CommentId, ContentError, ContentResult, ContentStore, ContentTarget,
    ContentType, UserId,
};
use tracing::{info, instrument};

use crate::cascade::{CascadeDeletionEngine, CascadeOutcome, CascadeReport};
use crate::references::ReferenceIndexer;
use crate::transaction::TransactionCoordinator;

pub struct CommentService<S> {
    coordinator: TransactionCoordinator<S>,
    indexer: ReferenceIndexer,
    engine: CascadeDeletionEngine,
}

impl<S: ContentStore> CommentService<S> {
    pub fn new(coordinator: TransactionCoordinator<S>, engine: CascadeDeletionEngine) -> Self {
        Self {
            coordinator,
            indexer: ReferenceIndexer,
            engine,
        }
    }

    /// Attaches a new comment to `target`, optionally as a reply to `parent`.
    ///
    /// The parent must exist and hang off the same target. Comments on an
    /// article are registered in the article's `comments` set.
    #[instrument(skip_all, fields(author = %author, target = %target, parent = ?parent))]
    pub async fn create_comment(
        &self,
        author: UserId,
        target: ContentTarget,
        body: &str,
        parent: Option<CommentId>,
    ) -> ContentResult<Comment> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self
            .create_in(store, tx, Comment::new(author, target, body, parent))
            .await;
        let comment = txn.finish(outcome).await?;
        info!(comment = %comment.id, "comment created");
        Ok(comment)
    }

    /// Replaces the body of a comment written by `author`.
    #[instrument(skip_all, fields(comment = %id, author = %author))]
    pub async fn update_comment(
        &self,
        id: CommentId,
        author: UserId,
        body: &str,
    ) -> ContentResult<Comment> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.update_in(store, tx, id, author, body).await;
        txn.finish(outcome).await
    }

    /// Deletes a comment written by `author` together with its reply subtree
    /// and every like on any of them.
    ///
    /// `content_type` is the kind of content the comment is attached to; a
    /// mismatch is treated like a missing comment.
    #[instrument(skip_all, fields(comment = %id, author = %author, content_type = %content_type))]
    pub async fn delete_comment(
        &self,
        id: CommentId,
        author: UserId,
        content_type: ContentType,
    ) -> ContentResult<CascadeReport> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.delete_in(store, tx, id, author, content_type).await;
        let report = txn.finish(outcome).await?;
        info!(
            replies = report.comments_deleted.len(),
            likes = report.likes_deleted.len(),
            "comment deleted"
        );
        Ok(report)
    }

    async fn create_in(&self, store: &S, tx: &mut S::Tx, comment: Comment) -> ContentResult<Comment> {
        if !store.exists(tx, comment.target).await? {
            return Err(ContentError::TargetNotFound(comment.target));
        }
        if let Some(parent) = comment.parent {
            match store.find_comment(tx, parent).await? {
                Some(found) if found.target == comment.target => {}
                _ => return Err(ContentError::ParentNotFound(parent)),
            }
        }

        store.insert_comment(tx, &comment).await?;
        if let ContentTarget::Article(_) = comment.target {
            self.indexer
                .add_child(store, tx, comment.target, BackReference::Comment(comment.id))
                .await?;
        }
        Ok(comment)
    }

    async fn update_in(
        &self,
        store: &S,
        tx: &mut S::Tx,
        id: CommentId,
        author: UserId,
        body: &str,
    ) -> ContentResult<Comment> {
        let mut comment = owned_comment(store, tx, id, author).await?;
        comment.body = body.to_string();
        comment.edited_at = Some(Utc::now());
        if !store.update_comment(tx, &comment).await? {
            return Err(ContentError::NotFoundOrNotAuthorized);
        }
        Ok(comment)
    }

    async fn delete_in(
        &self,
        store: &S,
        tx: &mut S::Tx,
        id: CommentId,
        author: UserId,
        content_type: ContentType,
    ) -> ContentResult<CascadeReport> {
        let comment = owned_comment(store, tx, id, author).await?;
        if comment.target.content_type() != content_type {
            return Err(ContentError::NotFoundOrNotAuthorized);
        }
        match self.engine.execute(store, tx, ContentTarget::Comment(id)).await? {
            CascadeOutcome::Deleted(report) => Ok(report),
            CascadeOutcome::NothingToDelete => Err(ContentError::NotFoundOrNotAuthorized),
        }
    }
}

async fn owned_comment<S: ContentStore>(
    store: &S,
    tx: &mut S::Tx,
    id: CommentId,
    author: UserId,
) -> ContentResult<Comment> {
    store
        .find_comment(tx, id)
        .await?
        .filter(|comment| comment.author == author)
        .ok_or(ContentError::NotFoundOrNotAuthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domains::{ArticleId, MockContentStore};
    use mockall::predicate::always;

    fn service(store: MockContentStore) -> CommentService<MockContentStore> {
        CommentService::new(
            TransactionCoordinator::new(Arc::new(store)),
            CascadeDeletionEngine::default(),
        )
    }

    fn transactional(rollbacks: usize, commits: usize) -> MockContentStore {
        let mut store = MockContentStore::new();
        store.expect_begin().times(1).returning(|| Ok(()));
        store.expect_rollback().times(rollbacks).returning(|_| Ok(()));
        store.expect_commit().times(commits).returning(|_| Ok(()));
        store
    }

    #[tokio::test]
    async fn missing_target_is_rejected_before_insert() {
        let mut store = transactional(1, 0);
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert_comment().never();

        let target = ContentTarget::Article(ArticleId::generate());
        let err = service(store)
            .create_comment(UserId::generate(), target, "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::TargetNotFound(t) if t == target));
    }

    #[tokio::test]
    async fn parent_on_another_target_is_parent_not_found() {
        let target = ContentTarget::Comment(CommentId::generate());
        let elsewhere = ContentTarget::Article(ArticleId::generate());
        let parent = Comment::new(UserId::generate(), elsewhere, "elsewhere", None);
        let parent_id = parent.id;

        let mut store = transactional(1, 0);
        store.expect_exists().returning(|_, _| Ok(true));
        store
            .expect_find_comment()
            .with(always(), mockall::predicate::eq(parent_id))
            .returning(move |_, _| Ok(Some(parent.clone())));
        store.expect_insert_comment().never();

        let err = service(store)
            .create_comment(UserId::generate(), target, "reply", Some(parent_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::ParentNotFound(id) if id == parent_id));
    }

    #[tokio::test]
    async fn comment_on_comment_adds_no_back_reference() {
        let mut store = transactional(0, 1);
        store.expect_exists().returning(|_, _| Ok(true));
        store.expect_insert_comment().times(1).returning(|_, _| Ok(()));
        store.expect_find_article().never();
        store.expect_update_article().never();

        let comment = service(store)
            .create_comment(
                UserId::generate(),
                CommentId::generate().into(),
                "nested",
                None,
            )
            .await
            .unwrap();
        assert!(!comment.is_reply());
    }

    #[tokio::test]
    async fn edit_by_stranger_leaves_comment_untouched() {
        let stored = Comment::new(
            UserId::generate(),
            ArticleId::generate().into(),
            "original",
            None,
        );
        let id = stored.id;

        let mut store = transactional(1, 0);
        store
            .expect_find_comment()
            .returning(move |_, _| Ok(Some(stored.clone())));
        store.expect_update_comment().never();

        let err = service(store)
            .update_comment(id, UserId::generate(), "hijacked")
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFoundOrNotAuthorized));
    }

    #[tokio::test]
    async fn edit_records_edit_time() {
        let author = UserId::generate();
        let stored = Comment::new(author, ArticleId::generate().into(), "original", None);
        let id = stored.id;
        let posted_at = stored.posted_at;

        let mut store = transactional(0, 1);
        store
            .expect_find_comment()
            .returning(move |_, _| Ok(Some(stored.clone())));
        store
            .expect_update_comment()
            .withf(|_, comment| comment.body == "revised")
            .times(1)
            .returning(|_, _| Ok(true));

        let comment = service(store).update_comment(id, author, "revised").await.unwrap();
        assert_eq!(comment.posted_at, posted_at);
        assert!(comment.edited_at.is_some());
    }

    #[tokio::test]
    async fn delete_with_wrong_content_type_is_refused() {
        let author = UserId::generate();
        let stored = Comment::new(author, ArticleId::generate().into(), "on an article", None);
        let id = stored.id;

        let mut store = transactional(1, 0);
        store
            .expect_find_comment()
            .returning(move |_, _| Ok(Some(stored.clone())));
        store.expect_delete_comment().never();

        let err = service(store)
            .delete_comment(id, author, ContentType::Comment)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFoundOrNotAuthorized));
    }
}
