//! services/src/lib.rs
//!
//! The content operations. Every write runs inside exactly one store
//! transaction opened by the [`TransactionCoordinator`]; reference sets are
//! kept in sync by the [`ReferenceIndexer`] and removals go through the
//! [`CascadeDeletionEngine`].

use std::sync::Arc;

use domains::ContentStore;

pub mod article_service;
pub mod cascade;
pub mod comment_service;
pub mod like_service;
pub mod references;
pub mod transaction;

pub use article_service::ArticleService;
pub use cascade::{CascadeDeletionEngine, CascadeLimits, CascadeOutcome, CascadePlan, CascadeReport};
pub use comment_service::CommentService;
pub use like_service::LikeService;
pub use references::{ReferenceChange, ReferenceIndexer};
pub use transaction::{Transaction, TransactionCoordinator};

/// The three services over one shared store.
pub struct ContentServices<S> {
    pub articles: ArticleService<S>,
    pub comments: CommentService<S>,
    pub likes: LikeService<S>,
}

impl<S: ContentStore> ContentServices<S> {
    pub fn new(store: Arc<S>, limits: CascadeLimits) -> Self {
        let coordinator = TransactionCoordinator::new(store);
        let engine = CascadeDeletionEngine::new(limits);
        Self {
            articles: ArticleService::new(coordinator.clone(), engine.clone()),
            comments: CommentService::new(coordinator.clone(), engine),
            likes: LikeService::new(coordinator),
        }
    }
}
