//! Transactional cascade deletion.
//!
//! Removing an article or comment removes everything that depends on it:
//! every comment attached to it or replying to it (transitively), every like
//! on any of those, and the likes on the root itself. The reply forest is
//! walked breadth-first with an explicit queue, so thread depth is bounded by
//! memory rather than by the call stack.
//!
//! Deletion order is likes, then comments deepest-first, then the root.
//! Afterwards, every deleted comment whose owner survives is unlinked from
//! that owner's `comments` set.

use std::collections::{HashSet, VecDeque};

use domains::{
    BackReference, Comment, CommentId, ContentError, ContentResult, ContentStore, ContentTarget,
    LikeId,
};
use tracing::{debug, info};

use crate::references::{ReferenceChange, ReferenceIndexer};

/// Guard against unexpectedly large cascades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeLimits {
    /// Maximum entities (root included) one cascade may delete.
    /// `None` means unbounded.
    pub max_entities: Option<usize>,
}

/// The transitive closure computed before anything is deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePlan {
    pub root: ContentTarget,
    /// The root itself when it is a comment; its owner needs unlinking.
    pub root_comment: Option<Comment>,
    /// Dependent comments in discovery order: parents before children.
    pub comments: Vec<Comment>,
    pub likes: Vec<LikeId>,
}

impl CascadePlan {
    pub fn entity_count(&self) -> usize {
        1 + self.comments.len() + self.likes.len()
    }

    fn deleted_targets(&self) -> HashSet<ContentTarget> {
        self.comments
            .iter()
            .map(|comment| ContentTarget::Comment(comment.id))
            .chain(std::iter::once(self.root))
            .collect()
    }
}

/// What an executed cascade removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub root: ContentTarget,
    pub comments_deleted: Vec<CommentId>,
    pub likes_deleted: Vec<LikeId>,
    /// Back-references removed from surviving owners.
    pub references_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// The root did not exist (already deleted, or never was).
    NothingToDelete,
    Deleted(CascadeReport),
}

#[derive(Debug, Clone, Default)]
pub struct CascadeDeletionEngine {
    limits: CascadeLimits,
    indexer: ReferenceIndexer,
}

impl CascadeDeletionEngine {
    pub fn new(limits: CascadeLimits) -> Self {
        Self {
            limits,
            indexer: ReferenceIndexer,
        }
    }

    pub fn limits(&self) -> CascadeLimits {
        self.limits
    }

    /// Deletes `root` and its dependents inside `tx`.
    ///
    /// Invoking it on an id that no longer exists is a no-op reporting
    /// [`CascadeOutcome::NothingToDelete`].
    pub async fn execute<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        root: ContentTarget,
    ) -> ContentResult<CascadeOutcome> {
        let Some(plan) = self.plan(store, tx, root).await? else {
            debug!(%root, "cascade root missing, nothing to delete");
            return Ok(CascadeOutcome::NothingToDelete);
        };
        let report = self.apply(store, tx, plan).await?;
        info!(
            %root,
            comments = report.comments_deleted.len(),
            likes = report.likes_deleted.len(),
            references = report.references_removed,
            "cascade deleted"
        );
        Ok(CascadeOutcome::Deleted(report))
    }

    /// Computes the deletion set of `root` without modifying anything.
    /// `None` when the root does not exist.
    pub async fn plan<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        root: ContentTarget,
    ) -> ContentResult<Option<CascadePlan>> {
        let mut visited = HashSet::new();
        let root_comment = match root {
            ContentTarget::Article(id) => {
                if store.find_article(tx, id).await?.is_none() {
                    return Ok(None);
                }
                None
            }
            ContentTarget::Comment(id) => {
                let Some(comment) = store.find_comment(tx, id).await? else {
                    return Ok(None);
                };
                visited.insert(id);
                Some(comment)
            }
        };

        let mut queue = VecDeque::from([root]);
        let mut comments = Vec::new();
        let mut likes = Vec::new();

        while let Some(node) = queue.pop_front() {
            likes.extend(
                store
                    .likes_by_target(tx, node)
                    .await?
                    .into_iter()
                    .map(|like| like.id),
            );

            let mut dependents = store.comments_by_target(tx, node).await?;
            if let ContentTarget::Comment(id) = node {
                dependents.extend(store.replies_to(tx, id).await?);
            }
            for comment in dependents {
                if visited.insert(comment.id) {
                    queue.push_back(ContentTarget::Comment(comment.id));
                    comments.push(comment);
                }
            }

            self.check_limit(1 + comments.len() + likes.len())?;
        }

        debug!(
            %root,
            comments = comments.len(),
            likes = likes.len(),
            "cascade planned"
        );
        Ok(Some(CascadePlan {
            root,
            root_comment,
            comments,
            likes,
        }))
    }

    async fn apply<S: ContentStore>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        plan: CascadePlan,
    ) -> ContentResult<CascadeReport> {
        let mut likes_deleted = Vec::with_capacity(plan.likes.len());
        for &like in &plan.likes {
            if store.delete_like(tx, like).await? {
                likes_deleted.push(like);
            } else {
                debug!(%like, "like already gone");
            }
        }

        let mut comments_deleted = Vec::with_capacity(plan.comments.len());
        for comment in plan.comments.iter().rev() {
            if store.delete_comment(tx, comment.id).await? {
                comments_deleted.push(comment.id);
            }
        }

        match plan.root {
            ContentTarget::Article(id) => store.delete_article(tx, id).await?,
            ContentTarget::Comment(id) => store.delete_comment(tx, id).await?,
        };

        let deleted = plan.deleted_targets();
        let mut references_removed = 0;
        for comment in plan.root_comment.iter().chain(plan.comments.iter()) {
            if deleted.contains(&comment.target) {
                continue;
            }
            let change = self
                .indexer
                .remove_child(store, tx, comment.target, BackReference::Comment(comment.id))
                .await?;
            if change == ReferenceChange::Removed {
                references_removed += 1;
            }
        }

        Ok(CascadeReport {
            root: plan.root,
            comments_deleted,
            likes_deleted,
            references_removed,
        })
    }

    fn check_limit(&self, count: usize) -> ContentResult<()> {
        match self.limits.max_entities {
            Some(limit) if count > limit => Err(ContentError::CascadeLimitExceeded { limit }),
            _ => Ok(()),
        }
    }
}
