//! The same behavioural contract, run against every `ContentStore` adapter.

use domains::{ContentError, ContentTarget, ContentType, Vote};
use integration_tests::{memory, sqlite, Users};
use storage_adapters::RowCounts;

macro_rules! store_contract {
    ($module:ident, $harness:expr) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn article_cascade_leaves_no_rows() {
                let harness = $harness;
                let users = Users::new();
                let thread = harness.seed_thread("Contract cascade", &users).await;

                harness
                    .services
                    .articles
                    .delete_article(&thread.article.slug, users.author)
                    .await
                    .unwrap();

                for target in thread.targets() {
                    assert!(!harness.exists(target).await);
                }
                assert_eq!(harness.counts().await, RowCounts::default());
            }

            #[tokio::test]
            async fn comment_cascade_unlinks_from_article() {
                let harness = $harness;
                let users = Users::new();
                let thread = harness.seed_thread("Contract subtree", &users).await;

                let report = harness
                    .services
                    .comments
                    .delete_comment(thread.c1.id, users.commenter, ContentType::Article)
                    .await
                    .unwrap();
                assert_eq!(report.comments_deleted, vec![thread.c2.id]);
                assert_eq!(report.likes_deleted.len(), 2);
                assert_eq!(report.references_removed, 2);

                let article = harness.article("contract-subtree").await.unwrap();
                assert!(article.comments.is_empty());
                assert_eq!(article.likes, vec![thread.l1.id]);
                assert_eq!(
                    harness.counts().await,
                    RowCounts {
                        articles: 1,
                        comments: 0,
                        likes: 1
                    }
                );
            }

            #[tokio::test]
            async fn duplicate_vote_is_refused() {
                let harness = $harness;
                let users = Users::new();
                let thread = harness.seed_thread("Contract votes", &users).await;

                let err = harness
                    .services
                    .likes
                    .add_like(users.voter, ContentTarget::Article(thread.article.id), Vote::Down)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ContentError::DuplicateVote));
                assert_eq!(harness.counts().await.likes, 3);
            }

            #[tokio::test]
            async fn failed_operation_leaves_prior_state() {
                let harness = $harness;
                let users = Users::new();
                let thread = harness.seed_thread("Contract rollback", &users).await;
                let before = harness.counts().await;

                let err = harness
                    .services
                    .comments
                    .create_comment(users.voter, thread.c1.id.into(), "stray", Some(thread.c2.id))
                    .await
                    .unwrap_err();
                assert!(matches!(err, ContentError::ParentNotFound(_)));
                assert_eq!(harness.counts().await, before);
            }

            #[tokio::test]
            async fn edits_survive_a_round_trip() {
                let harness = $harness;
                let users = Users::new();
                let thread = harness.seed_thread("Contract edits", &users).await;

                harness
                    .services
                    .comments
                    .update_comment(thread.c2.id, users.replier, "edited")
                    .await
                    .unwrap();
                let stored = harness.comment(thread.c2.id).await.unwrap();
                assert_eq!(stored.body, "edited");
                assert!(stored.edited_at.is_some());
                assert_eq!(stored.parent, Some(thread.c1.id));
                assert_eq!(stored.likes, vec![thread.l3.id]);

                let read = harness
                    .services
                    .articles
                    .get_article("contract-edits")
                    .await
                    .unwrap();
                assert_eq!(read.comments.len(), 2);
                assert_eq!(read.score(), 1);
            }
        }
    };
}

store_contract!(memory_store, memory());
store_contract!(sqlite_store, sqlite().await);
