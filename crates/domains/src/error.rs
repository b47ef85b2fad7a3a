//! # Errors
//!
//! Two layers: [`StoreError`] is what a storage adapter reports, and
//! [`ContentError`] is what the content operations hand back to callers.
//! Expected business outcomes (missing target, wrong owner, duplicate vote)
//! are ordinary variants; infrastructure faults collapse into `Store` or
//! `TransactionFailure`.

use thiserror::Error;

use crate::ids::{CommentId, ContentTarget};

/// Faults raised by a `ContentStore` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A store-level uniqueness constraint rejected the write
    /// (e.g., second like by the same voter, duplicate slug).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The backend failed (e.g., connection lost, I/O error).
    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A persisted row could not be mapped back to a domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// The error type for all content operations.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The referenced article or comment does not exist.
    #[error("target {0} not found")]
    TargetNotFound(ContentTarget),

    /// The parent comment does not exist or hangs off a different target.
    #[error("parent comment {0} not found")]
    ParentNotFound(CommentId),

    /// The entity is missing or the caller does not own it. The two cases are
    /// deliberately indistinguishable.
    #[error("not found or not authorized")]
    NotFoundOrNotAuthorized,

    /// Resource not found (e.g., article slug)
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// The voter already has a like on this target.
    #[error("duplicate vote")]
    DuplicateVote,

    /// Resource already exists (e.g., duplicate article slug)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The title transliterates to nothing a slug can be built from.
    #[error("title {0:?} has no letters or digits to build a slug from")]
    EmptySlug(String),

    /// A cascade would touch more entities than the configured guard allows.
    #[error("cascade exceeds the limit of {limit} entities")]
    CascadeLimitExceeded { limit: usize },

    /// The store could not commit the transaction.
    #[error("transaction failure: {0}")]
    TransactionFailure(String),

    /// Unexpected infrastructure failure.
    #[error("internal store error: {0}")]
    Store(#[from] StoreError),
}

impl ContentError {
    /// True for the outcomes a caller is expected to handle
    /// (as opposed to infrastructure faults).
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            ContentError::TransactionFailure(_) | ContentError::Store(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A specialized Result type for content operations.
pub type ContentResult<T> = std::result::Result<T, ContentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ArticleId;

    #[test]
    fn store_errors_convert_into_generic_failure() {
        let err: ContentError = StoreError::Backend("disk full".into()).into();
        assert!(matches!(err, ContentError::Store(_)));
        assert!(!err.is_expected());
    }

    #[test]
    fn ownership_failure_does_not_leak_existence() {
        assert_eq!(
            ContentError::NotFoundOrNotAuthorized.to_string(),
            "not found or not authorized"
        );
        assert!(ContentError::NotFoundOrNotAuthorized.is_expected());
    }

    #[test]
    fn target_not_found_names_the_target() {
        let id = ArticleId::generate();
        let err = ContentError::TargetNotFound(id.into());
        assert_eq!(err.to_string(), format!("target Article:{id} not found"));
    }
}
