//! Back-reference maintenance.
//!
//! Articles keep `comments` and `likes` id sets, comments keep a `likes` set.
//! The [`ReferenceIndexer`] treats each of them as a true set over the store's
//! update primitives: adding a present id or removing an absent one changes
//! nothing, and an owner that no longer exists is reported, not failed on.

use domains::{BackReference, ContentResult, ContentStore, ContentTarget};
use tracing::debug;

/// What a single add/remove did to the owner's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceChange {
    Added,
    Removed,
    /// The set already had (add) or lacked (remove) the id.
    Unchanged,
    /// The owner is gone; treated as already consistent.
    OwnerMissing,
    /// The owner kind keeps no set for this child kind (comments do not list
    /// the comments attached to them).
    Untracked,
}

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Insert,
    Remove,
}

/// Stateless, idempotent adapter over the store's update primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceIndexer;

impl ReferenceIndexer {
    /// Inserts `child` into the matching set of `owner` if absent.
    pub async fn add_child<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        owner: ContentTarget,
        child: BackReference,
    ) -> ContentResult<ReferenceChange> {
        self.apply(store, tx, owner, child, SetOp::Insert).await
    }

    /// Removes `child` from the matching set of `owner` if present.
    pub async fn remove_child<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        owner: ContentTarget,
        child: BackReference,
    ) -> ContentResult<ReferenceChange> {
        self.apply(store, tx, owner, child, SetOp::Remove).await
    }

    async fn apply<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        owner: ContentTarget,
        child: BackReference,
        op: SetOp,
    ) -> ContentResult<ReferenceChange> {
        let change = match owner {
            ContentTarget::Article(id) => {
                let Some(mut article) = store.find_article(tx, id).await? else {
                    debug!(%owner, ?child, "reference owner missing, nothing to update");
                    return Ok(ReferenceChange::OwnerMissing);
                };
                let changed = match child {
                    BackReference::Comment(comment) => edit(&mut article.comments, comment, op),
                    BackReference::Like(like) => edit(&mut article.likes, like, op),
                };
                if changed && !store.update_article(tx, &article).await? {
                    return Ok(ReferenceChange::OwnerMissing);
                }
                outcome(changed, op)
            }
            ContentTarget::Comment(id) => {
                let BackReference::Like(like) = child else {
                    return Ok(ReferenceChange::Untracked);
                };
                let Some(mut comment) = store.find_comment(tx, id).await? else {
                    debug!(%owner, ?child, "reference owner missing, nothing to update");
                    return Ok(ReferenceChange::OwnerMissing);
                };
                let changed = edit(&mut comment.likes, like, op);
                if changed && !store.update_comment(tx, &comment).await? {
                    return Ok(ReferenceChange::OwnerMissing);
                }
                outcome(changed, op)
            }
        };
        Ok(change)
    }
}

fn edit<T: PartialEq>(set: &mut Vec<T>, item: T, op: SetOp) -> bool {
    match op {
        SetOp::Insert if set.contains(&item) => false,
        SetOp::Insert => {
            set.push(item);
            true
        }
        SetOp::Remove => {
            let before = set.len();
            set.retain(|existing| existing != &item);
            set.len() != before
        }
    }
}

fn outcome(changed: bool, op: SetOp) -> ReferenceChange {
    match (changed, op) {
        (false, _) => ReferenceChange::Unchanged,
        (true, SetOp::Insert) => ReferenceChange::Added,
        (true, SetOp::Remove) => ReferenceChange::Removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Article, ArticleId, CommentId, LikeId, MockContentStore, UserId};
    use mockall::predicate::eq;

    fn article_with_comment(comment: CommentId) -> Article {
        let mut article = Article::new(UserId::generate(), "Reference sets", "body");
        article.comments.push(comment);
        article
    }

    #[test]
    fn edit_behaves_as_a_set() {
        let mut set = vec![1, 2];
        assert!(!edit(&mut set, 2, SetOp::Insert));
        assert!(edit(&mut set, 3, SetOp::Insert));
        assert!(edit(&mut set, 1, SetOp::Remove));
        assert!(!edit(&mut set, 1, SetOp::Remove));
        assert_eq!(set, vec![2, 3]);
    }

    #[tokio::test]
    async fn adding_present_child_skips_the_update() {
        let comment = CommentId::generate();
        let article = article_with_comment(comment);
        let article_id = article.id;

        let mut store = MockContentStore::new();
        store
            .expect_find_article()
            .with(mockall::predicate::always(), eq(article_id))
            .returning(move |_, _| Ok(Some(article.clone())));
        store.expect_update_article().never();

        let change = ReferenceIndexer
            .add_child(&store, &mut (), article_id.into(), comment.into())
            .await
            .unwrap();
        assert_eq!(change, ReferenceChange::Unchanged);
    }

    #[tokio::test]
    async fn removing_from_missing_owner_is_not_an_error() {
        let mut store = MockContentStore::new();
        store.expect_find_article().returning(|_, _| Ok(None));
        store.expect_update_article().never();

        let change = ReferenceIndexer
            .remove_child(&store, &mut (), ArticleId::generate().into(), LikeId::generate().into())
            .await
            .unwrap();
        assert_eq!(change, ReferenceChange::OwnerMissing);
    }

    #[tokio::test]
    async fn removal_writes_the_shrunk_set() {
        let comment = CommentId::generate();
        let article = article_with_comment(comment);
        let article_id = article.id;

        let mut store = MockContentStore::new();
        store
            .expect_find_article()
            .returning(move |_, _| Ok(Some(article.clone())));
        store
            .expect_update_article()
            .withf(|_, updated| updated.comments.is_empty())
            .times(1)
            .returning(|_, _| Ok(true));

        let change = ReferenceIndexer
            .remove_child(&store, &mut (), article_id.into(), comment.into())
            .await
            .unwrap();
        assert_eq!(change, ReferenceChange::Removed);
    }

    #[tokio::test]
    async fn comments_do_not_track_comments() {
        let store = MockContentStore::new();
        let change = ReferenceIndexer
            .add_child(&store, &mut (), CommentId::generate().into(), CommentId::generate().into())
            .await
            .unwrap();
        assert_eq!(change, ReferenceChange::Untracked);
    }
}
