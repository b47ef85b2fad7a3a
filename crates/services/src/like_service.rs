//! Votes on articles and comments.

use domains::{
    BackReference, ContentError, ContentResult, ContentStore, ContentTarget, Like, LikeId,
    StoreError, UserId, Vote,
};
use tracing::{debug, info, instrument};

use crate::references::{ReferenceChange, ReferenceIndexer};
use crate::transaction::TransactionCoordinator;

pub struct LikeService<S> {
    coordinator: TransactionCoordinator<S>,
    indexer: ReferenceIndexer,
}

impl<S: ContentStore> LikeService<S> {
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self {
            coordinator,
            indexer: ReferenceIndexer,
        }
    }

    /// Records `voter`'s vote on `target`. One vote per voter and target;
    /// a second one is `DuplicateVote`, whether caught by the lookup or by the
    /// store's unique constraint.
    #[instrument(skip_all, fields(voter = %voter, target = %target, vote = vote.value()))]
    pub async fn add_like(
        &self,
        voter: UserId,
        target: ContentTarget,
        vote: Vote,
    ) -> ContentResult<Like> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.add_in(store, tx, Like::new(voter, target, vote)).await;
        let like = txn.finish(outcome).await?;
        info!(like = %like.id, "like added");
        Ok(like)
    }

    /// Withdraws a vote cast by `voter`.
    #[instrument(skip_all, fields(like = %id, voter = %voter))]
    pub async fn delete_like(&self, id: LikeId, voter: UserId) -> ContentResult<Like> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.delete_in(store, tx, id, voter).await;
        let like = txn.finish(outcome).await?;
        info!(content = %like.target, "like deleted");
        Ok(like)
    }

    /// Whether `voter` already voted on `target`.
    pub async fn has_voted(&self, voter: UserId, target: ContentTarget) -> ContentResult<bool> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = store
            .find_like_by_voter(tx, voter, target)
            .await
            .map(|like| like.is_some())
            .map_err(ContentError::from);
        txn.finish(outcome).await
    }

    async fn add_in(&self, store: &S, tx: &mut S::Tx, like: Like) -> ContentResult<Like> {
        if !store.exists(tx, like.target).await? {
            return Err(ContentError::TargetNotFound(like.target));
        }
        if store
            .find_like_by_voter(tx, like.voter, like.target)
            .await?
            .is_some()
        {
            return Err(ContentError::DuplicateVote);
        }

        store.insert_like(tx, &like).await.map_err(|err| match err {
            StoreError::UniqueViolation(_) => ContentError::DuplicateVote,
            other => other.into(),
        })?;
        self.indexer
            .add_child(store, tx, like.target, BackReference::Like(like.id))
            .await?;
        Ok(like)
    }

    async fn delete_in(
        &self,
        store: &S,
        tx: &mut S::Tx,
        id: LikeId,
        voter: UserId,
    ) -> ContentResult<Like> {
        let like = store
            .find_like(tx, id)
            .await?
            .filter(|like| like.voter == voter)
            .ok_or(ContentError::NotFoundOrNotAuthorized)?;
        if !store.delete_like(tx, id).await? {
            return Err(ContentError::NotFoundOrNotAuthorized);
        }

        let change = self
            .indexer
            .remove_child(store, tx, like.target, BackReference::Like(id))
            .await?;
        if change == ReferenceChange::OwnerMissing {
            debug!(content = %like.target, "liked content already gone");
        }
        Ok(like)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domains::{Article, ArticleId, CommentId, MockContentStore};
    use tokio_test::assert_ok;

    fn service(store: MockContentStore) -> LikeService<MockContentStore> {
        LikeService::new(TransactionCoordinator::new(Arc::new(store)))
    }

    fn transactional(rollbacks: usize, commits: usize) -> MockContentStore {
        let mut store = MockContentStore::new();
        store.expect_begin().times(1).returning(|| Ok(()));
        store.expect_rollback().times(rollbacks).returning(|_| Ok(()));
        store.expect_commit().times(commits).returning(|_| Ok(()));
        store
    }

    #[tokio::test]
    async fn like_on_missing_target_is_rejected() {
        let mut store = transactional(1, 0);
        store.expect_exists().returning(|_, _| Ok(false));
        store.expect_insert_like().never();

        let err = service(store)
            .add_like(UserId::generate(), CommentId::generate().into(), Vote::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn existing_vote_short_circuits_to_duplicate() {
        let voter = UserId::generate();
        let mut store = transactional(1, 0);
        store.expect_exists().returning(|_, _| Ok(true));
        store
            .expect_find_like_by_voter()
            .returning(|_, voter, target| Ok(Some(Like::new(voter, target, Vote::Up))));
        store.expect_insert_like().never();

        let err = service(store)
            .add_like(voter, ArticleId::generate().into(), Vote::Down)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::DuplicateVote));
    }

    #[tokio::test]
    async fn unique_violation_on_insert_is_duplicate_vote() {
        let mut store = transactional(1, 0);
        store.expect_exists().returning(|_, _| Ok(true));
        store.expect_find_like_by_voter().returning(|_, _, _| Ok(None));
        store
            .expect_insert_like()
            .returning(|_, _| Err(StoreError::UniqueViolation("likes.voter_target".into())));

        let err = service(store)
            .add_like(UserId::generate(), ArticleId::generate().into(), Vote::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::DuplicateVote));
    }

    #[tokio::test]
    async fn like_is_registered_on_its_article() {
        let article = Article::new(UserId::generate(), "Votes", "body");
        let article_id = article.id;

        let mut store = transactional(0, 1);
        store.expect_exists().returning(|_, _| Ok(true));
        store.expect_find_like_by_voter().returning(|_, _, _| Ok(None));
        store.expect_insert_like().times(1).returning(|_, _| Ok(()));
        store
            .expect_find_article()
            .returning(move |_, _| Ok(Some(article.clone())));
        store
            .expect_update_article()
            .withf(|_, updated| updated.likes.len() == 1)
            .times(1)
            .returning(|_, _| Ok(true));

        let like = assert_ok!(
            service(store)
                .add_like(UserId::generate(), article_id.into(), Vote::Up)
                .await
        );
        assert_eq!(like.target, ContentTarget::Article(article_id));
    }

    #[tokio::test]
    async fn only_the_voter_may_withdraw() {
        let like = Like::new(UserId::generate(), ArticleId::generate().into(), Vote::Up);
        let id = like.id;

        let mut store = transactional(1, 0);
        store
            .expect_find_like()
            .returning(move |_, _| Ok(Some(like.clone())));
        store.expect_delete_like().never();

        let err = service(store)
            .delete_like(id, UserId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFoundOrNotAuthorized));
    }

    #[tokio::test]
    async fn withdrawing_from_deleted_content_still_commits() {
        let voter = UserId::generate();
        let like = Like::new(voter, CommentId::generate().into(), Vote::Down);
        let id = like.id;

        let mut store = transactional(0, 1);
        store
            .expect_find_like()
            .returning(move |_, _| Ok(Some(like.clone())));
        store.expect_delete_like().times(1).returning(|_, _| Ok(true));
        store.expect_find_comment().returning(|_, _| Ok(None));
        store.expect_update_comment().never();

        let removed = service(store).delete_like(id, voter).await.unwrap();
        assert_eq!(removed.id, id);
    }
}
