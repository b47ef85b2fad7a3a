//! integration-tests/src/lib.rs
//!
//! Shared fixtures: a store wired to the content services, plus a seeded
//! thread matching the shape most cascade tests need.
//!
//! ```text
//! article A
//! ├── like L1
//! └── comment C1 ── like L2
//!     └── reply C2 ── like L3
//! ```

use std::sync::Arc;

use domains::{Article, Comment, CommentId, ContentStore, ContentTarget, Like, UserId, Vote};
use services::{CascadeLimits, ContentServices};
use storage_adapters::{MemoryContentStore, RowCounter, RowCounts};

pub struct Harness<S> {
    pub store: Arc<S>,
    pub services: ContentServices<S>,
}

impl<S: ContentStore + RowCounter> Harness<S> {
    pub fn new(store: S, limits: CascadeLimits) -> Self {
        let store = Arc::new(store);
        let services = ContentServices::new(Arc::clone(&store), limits);
        Self { store, services }
    }

    pub async fn counts(&self) -> RowCounts {
        self.store.row_counts().await.expect("row counts")
    }

    /// Whether `target` is committed, read in a throwaway transaction.
    pub async fn exists(&self, target: ContentTarget) -> bool {
        let mut tx = self.store.begin().await.expect("begin");
        let found = self.store.exists(&mut tx, target).await.expect("exists");
        self.store.rollback(tx).await.expect("rollback");
        found
    }

    pub async fn article(&self, slug: &str) -> Option<Article> {
        let mut tx = self.store.begin().await.expect("begin");
        let found = self
            .store
            .find_article_by_slug(&mut tx, slug)
            .await
            .expect("find article");
        self.store.rollback(tx).await.expect("rollback");
        found
    }

    pub async fn comment(&self, id: CommentId) -> Option<Comment> {
        let mut tx = self.store.begin().await.expect("begin");
        let found = self.store.find_comment(&mut tx, id).await.expect("find comment");
        self.store.rollback(tx).await.expect("rollback");
        found
    }

    pub async fn likes_on(&self, target: ContentTarget) -> Vec<Like> {
        let mut tx = self.store.begin().await.expect("begin");
        let found = self
            .store
            .likes_by_target(&mut tx, target)
            .await
            .expect("likes by target");
        self.store.rollback(tx).await.expect("rollback");
        found
    }

    /// Seeds the thread drawn in the module docs, authored by `users`.
    pub async fn seed_thread(&self, title: &str, users: &Users) -> Thread {
        let article = self
            .services
            .articles
            .create_article(users.author, title, "body")
            .await
            .expect("create article");
        let on_article = ContentTarget::Article(article.id);

        let c1 = self
            .services
            .comments
            .create_comment(users.commenter, on_article, "C1", None)
            .await
            .expect("create C1");
        let c2 = self
            .services
            .comments
            .create_comment(users.replier, on_article, "C2", Some(c1.id))
            .await
            .expect("create C2");

        let l1 = self
            .services
            .likes
            .add_like(users.voter, on_article, Vote::Up)
            .await
            .expect("like A");
        let l2 = self
            .services
            .likes
            .add_like(users.voter, c1.id.into(), Vote::Up)
            .await
            .expect("like C1");
        let l3 = self
            .services
            .likes
            .add_like(users.voter, c2.id.into(), Vote::Down)
            .await
            .expect("like C2");

        Thread {
            article,
            c1,
            c2,
            l1,
            l2,
            l3,
        }
    }
}

/// Harness over a fresh in-memory store without a cascade limit.
pub fn memory() -> Harness<MemoryContentStore> {
    Harness::new(MemoryContentStore::new(), CascadeLimits::default())
}

/// Harness over a fresh in-memory SQLite database.
#[cfg(feature = "db-sqlite")]
pub async fn sqlite() -> Harness<storage_adapters::SqliteContentStore> {
    let store = storage_adapters::SqliteContentStore::connect("sqlite::memory:", 1)
        .await
        .expect("open sqlite");
    Harness::new(store, CascadeLimits::default())
}

/// Harness over the SQLite file at `path`, pooled over `connections`.
#[cfg(feature = "db-sqlite")]
pub async fn sqlite_file(
    path: &std::path::Path,
    connections: u32,
) -> Harness<storage_adapters::SqliteContentStore> {
    let url = format!("sqlite://{}", path.display());
    let store = storage_adapters::SqliteContentStore::connect(&url, connections)
        .await
        .expect("open sqlite file");
    Harness::new(store, CascadeLimits::default())
}

#[derive(Debug, Clone, Copy)]
pub struct Users {
    pub author: UserId,
    pub commenter: UserId,
    pub replier: UserId,
    pub voter: UserId,
}

impl Users {
    pub fn new() -> Self {
        Self {
            author: UserId::generate(),
            commenter: UserId::generate(),
            replier: UserId::generate(),
            voter: UserId::generate(),
        }
    }
}

impl Default for Users {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub article: Article,
    pub c1: Comment,
    pub c2: Comment,
    pub l1: Like,
    pub l2: Like,
    pub l3: Like,
}

impl Thread {
    pub fn targets(&self) -> [ContentTarget; 3] {
        [
            self.article.id.into(),
            self.c1.id.into(),
            self.c2.id.into(),
        ]
    }
}
