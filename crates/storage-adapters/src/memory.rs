//! # In-memory content store
//!
//! Committed rows live in three ordered maps behind one async mutex. A
//! transaction takes the mutex for its whole lifetime, so transactions are
//! serialized, and buffers its writes in an [`Overlay`] per table: reads see
//! the overlay first and the committed rows underneath. Commit folds the
//! overlays into the tables; dropping the transaction throws them away.
//!
//! Uniqueness of article slugs and of `(voter, target id)` likes is checked
//! against the merged view on every write.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use domains::{
    Article, ArticleId, Comment, CommentId, ContentStore, ContentTarget, Like, LikeId, StoreError,
    StoreResult, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{RowCounter, RowCounts};

#[derive(Debug, Default)]
struct Tables {
    articles: BTreeMap<ArticleId, Article>,
    comments: BTreeMap<CommentId, Comment>,
    likes: BTreeMap<LikeId, Like>,
}

/// Uncommitted writes over one table. `None` marks a deletion.
#[derive(Debug)]
struct Overlay<K, V> {
    pending: BTreeMap<K, Option<V>>,
}

impl<K: Ord + Copy, V: Clone> Overlay<K, V> {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    fn get<'a>(&'a self, base: &'a BTreeMap<K, V>, key: &K) -> Option<&'a V> {
        match self.pending.get(key) {
            Some(entry) => entry.as_ref(),
            None => base.get(key),
        }
    }

    fn put(&mut self, key: K, value: V) {
        self.pending.insert(key, Some(value));
    }

    fn remove(&mut self, key: K) {
        self.pending.insert(key, None);
    }

    /// Every visible row: committed rows not shadowed, then pending inserts.
    fn values<'a>(&'a self, base: &'a BTreeMap<K, V>) -> impl Iterator<Item = &'a V> + 'a {
        let committed = base
            .iter()
            .filter(|(key, _)| !self.pending.contains_key(*key))
            .map(|(_, value)| value);
        let pending = self.pending.values().filter_map(Option::as_ref);
        committed.chain(pending)
    }

    fn apply(self, base: &mut BTreeMap<K, V>) {
        for (key, entry) in self.pending {
            match entry {
                Some(value) => base.insert(key, value),
                None => base.remove(&key),
            };
        }
    }
}

/// Transaction handle of [`MemoryContentStore`].
pub struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    articles: Overlay<ArticleId, Article>,
    comments: Overlay<CommentId, Comment>,
    likes: Overlay<LikeId, Like>,
}

impl MemoryTx {
    fn article(&self, id: ArticleId) -> Option<&Article> {
        self.articles.get(&self.tables.articles, &id)
    }

    fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&self.tables.comments, &id)
    }

    fn like(&self, id: LikeId) -> Option<&Like> {
        self.likes.get(&self.tables.likes, &id)
    }

    fn articles(&self) -> impl Iterator<Item = &Article> {
        self.articles.values(&self.tables.articles)
    }

    fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.values(&self.tables.comments)
    }

    fn likes(&self) -> impl Iterator<Item = &Like> {
        self.likes.values(&self.tables.likes)
    }

    fn ensure_slug_free(&self, article: &Article) -> StoreResult<()> {
        let taken = self
            .articles()
            .any(|other| other.slug == article.slug && other.id != article.id);
        if taken {
            return Err(StoreError::UniqueViolation("articles.slug".to_string()));
        }
        Ok(())
    }

    fn publish(self) {
        let MemoryTx {
            mut tables,
            articles,
            comments,
            likes,
        } = self;
        articles.apply(&mut tables.articles);
        comments.apply(&mut tables.comments);
        likes.apply(&mut tables.likes);
    }
}

/// Process-local [`ContentStore`]. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowCounter for MemoryContentStore {
    async fn row_counts(&self) -> StoreResult<RowCounts> {
        let tables = self.tables.lock().await;
        Ok(RowCounts {
            articles: tables.articles.len(),
            comments: tables.comments.len(),
            likes: tables.likes.len(),
        })
    }
}

fn oldest_first(mut comments: Vec<Comment>) -> Vec<Comment> {
    comments.sort_by(|a, b| (a.posted_at, a.id).cmp(&(b.posted_at, b.id)));
    comments
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(MemoryTx {
            tables,
            articles: Overlay::new(),
            comments: Overlay::new(),
            likes: Overlay::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        tx.publish();
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> StoreResult<()> {
        drop(tx);
        Ok(())
    }

    async fn exists(&self, tx: &mut MemoryTx, target: ContentTarget) -> StoreResult<bool> {
        Ok(match target {
            ContentTarget::Article(id) => tx.article(id).is_some(),
            ContentTarget::Comment(id) => tx.comment(id).is_some(),
        })
    }

    async fn insert_article(&self, tx: &mut MemoryTx, article: &Article) -> StoreResult<()> {
        if tx.article(article.id).is_some() {
            return Err(StoreError::UniqueViolation("articles.id".to_string()));
        }
        tx.ensure_slug_free(article)?;
        tx.articles.put(article.id, article.clone());
        Ok(())
    }

    async fn find_article(&self, tx: &mut MemoryTx, id: ArticleId) -> StoreResult<Option<Article>> {
        Ok(tx.article(id).cloned())
    }

    async fn find_article_by_slug(&self, tx: &mut MemoryTx, slug: &str) -> StoreResult<Option<Article>> {
        Ok(tx.articles().find(|article| article.slug == slug).cloned())
    }

    async fn list_articles(&self, tx: &mut MemoryTx) -> StoreResult<Vec<Article>> {
        let mut articles: Vec<Article> = tx.articles().cloned().collect();
        articles.sort_by(|a, b| (b.published_at, b.id).cmp(&(a.published_at, a.id)));
        Ok(articles)
    }

    async fn update_article(&self, tx: &mut MemoryTx, article: &Article) -> StoreResult<bool> {
        if tx.article(article.id).is_none() {
            return Ok(false);
        }
        tx.ensure_slug_free(article)?;
        tx.articles.put(article.id, article.clone());
        Ok(true)
    }

    async fn delete_article(&self, tx: &mut MemoryTx, id: ArticleId) -> StoreResult<bool> {
        if tx.article(id).is_none() {
            return Ok(false);
        }
        tx.articles.remove(id);
        Ok(true)
    }

    async fn insert_comment(&self, tx: &mut MemoryTx, comment: &Comment) -> StoreResult<()> {
        if tx.comment(comment.id).is_some() {
            return Err(StoreError::UniqueViolation("comments.id".to_string()));
        }
        tx.comments.put(comment.id, comment.clone());
        Ok(())
    }

    async fn find_comment(&self, tx: &mut MemoryTx, id: CommentId) -> StoreResult<Option<Comment>> {
        Ok(tx.comment(id).cloned())
    }

    async fn update_comment(&self, tx: &mut MemoryTx, comment: &Comment) -> StoreResult<bool> {
        if tx.comment(comment.id).is_none() {
            return Ok(false);
        }
        tx.comments.put(comment.id, comment.clone());
        Ok(true)
    }

    async fn delete_comment(&self, tx: &mut MemoryTx, id: CommentId) -> StoreResult<bool> {
        if tx.comment(id).is_none() {
            return Ok(false);
        }
        tx.comments.remove(id);
        Ok(true)
    }

    async fn comments_by_target(
        &self,
        tx: &mut MemoryTx,
        target: ContentTarget,
    ) -> StoreResult<Vec<Comment>> {
        let found = tx
            .comments()
            .filter(|comment| comment.target == target)
            .cloned()
            .collect();
        Ok(oldest_first(found))
    }

    async fn replies_to(&self, tx: &mut MemoryTx, parent: CommentId) -> StoreResult<Vec<Comment>> {
        let found = tx
            .comments()
            .filter(|comment| comment.parent == Some(parent))
            .cloned()
            .collect();
        Ok(oldest_first(found))
    }

    async fn insert_like(&self, tx: &mut MemoryTx, like: &Like) -> StoreResult<()> {
        if tx.like(like.id).is_some() {
            return Err(StoreError::UniqueViolation("likes.id".to_string()));
        }
        let voted = tx.likes().any(|other| {
            other.voter == like.voter && other.target.target_id() == like.target.target_id()
        });
        if voted {
            return Err(StoreError::UniqueViolation("likes.voter_target".to_string()));
        }
        tx.likes.put(like.id, like.clone());
        Ok(())
    }

    async fn find_like(&self, tx: &mut MemoryTx, id: LikeId) -> StoreResult<Option<Like>> {
        Ok(tx.like(id).cloned())
    }

    async fn find_like_by_voter(
        &self,
        tx: &mut MemoryTx,
        voter: UserId,
        target: ContentTarget,
    ) -> StoreResult<Option<Like>> {
        Ok(tx
            .likes()
            .find(|like| like.voter == voter && like.target == target)
            .cloned())
    }

    async fn delete_like(&self, tx: &mut MemoryTx, id: LikeId) -> StoreResult<bool> {
        if tx.like(id).is_none() {
            return Ok(false);
        }
        tx.likes.remove(id);
        Ok(true)
    }

    async fn likes_by_target(&self, tx: &mut MemoryTx, target: ContentTarget) -> StoreResult<Vec<Like>> {
        let mut found: Vec<Like> = tx
            .likes()
            .filter(|like| like.target == target)
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.liked_at, a.id).cmp(&(b.liked_at, b.id)));
        Ok(found)
    }
}
