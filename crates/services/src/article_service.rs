//! Article lifecycle and reads.

use domains::{
    slugify, Article, ArticleThread, CommentView, ContentError, ContentResult, ContentStore,
    ContentTarget, StoreError, UserId,
};
use tracing::{info, instrument};

use crate::cascade::{CascadeDeletionEngine, CascadeOutcome, CascadeReport};
use crate::transaction::TransactionCoordinator;

pub struct ArticleService<S> {
    coordinator: TransactionCoordinator<S>,
    engine: CascadeDeletionEngine,
}

impl<S: ContentStore> ArticleService<S> {
    pub fn new(coordinator: TransactionCoordinator<S>, engine: CascadeDeletionEngine) -> Self {
        Self {
            coordinator,
            engine,
        }
    }

    /// Publishes a new article. The slug comes from the title and must be
    /// free, otherwise `Conflict`. A title with no letters or digits is
    /// `EmptySlug`.
    #[instrument(skip_all, fields(author = %author))]
    pub async fn create_article(
        &self,
        author: UserId,
        title: &str,
        body: &str,
    ) -> ContentResult<Article> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.create_in(store, tx, Article::new(author, title, body)).await;
        let article = txn.finish(outcome).await?;
        info!(article = %article.id, slug = %article.slug, "article created");
        Ok(article)
    }

    /// Rewrites title and body of the article at `slug` when `author` owns it.
    /// A new title moves the article to a new slug.
    #[instrument(skip_all, fields(slug = %slug, author = %author))]
    pub async fn update_article(
        &self,
        slug: &str,
        author: UserId,
        title: &str,
        body: &str,
    ) -> ContentResult<Article> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.update_in(store, tx, slug, author, title, body).await;
        txn.finish(outcome).await
    }

    /// Deletes the article at `slug` with all its comments, replies and likes.
    /// Only the author may delete; anyone else gets `NotFound`.
    #[instrument(skip_all, fields(slug = %slug, author = %author))]
    pub async fn delete_article(&self, slug: &str, author: UserId) -> ContentResult<CascadeReport> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.delete_in(store, tx, slug, author).await;
        let report = txn.finish(outcome).await?;
        info!(
            comments = report.comments_deleted.len(),
            likes = report.likes_deleted.len(),
            "article deleted"
        );
        Ok(report)
    }

    /// The article at `slug` with its likes and comments.
    #[instrument(skip_all, fields(slug = %slug))]
    pub async fn get_article(&self, slug: &str) -> ContentResult<ArticleThread> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = self.thread_in(store, tx, slug).await;
        txn.finish(outcome).await
    }

    /// All articles, newest first.
    pub async fn list_articles(&self) -> ContentResult<Vec<Article>> {
        let mut txn = self.coordinator.begin().await?;
        let (store, tx) = txn.parts();
        let outcome = store.list_articles(tx).await.map_err(ContentError::from);
        txn.finish(outcome).await
    }

    async fn create_in(&self, store: &S, tx: &mut S::Tx, article: Article) -> ContentResult<Article> {
        if article.slug.is_empty() {
            return Err(ContentError::EmptySlug(article.title));
        }
        if store.find_article_by_slug(tx, &article.slug).await?.is_some() {
            return Err(slug_taken(&article.slug));
        }
        store
            .insert_article(tx, &article)
            .await
            .map_err(|err| conflict_on_unique(err, &article.slug))?;
        Ok(article)
    }

    async fn update_in(
        &self,
        store: &S,
        tx: &mut S::Tx,
        slug: &str,
        author: UserId,
        title: &str,
        body: &str,
    ) -> ContentResult<Article> {
        let mut article = owned_article(store, tx, slug, author).await?;

        let new_slug = slugify(title);
        if new_slug.is_empty() {
            return Err(ContentError::EmptySlug(title.to_string()));
        }
        if new_slug != article.slug && store.find_article_by_slug(tx, &new_slug).await?.is_some() {
            return Err(slug_taken(&new_slug));
        }
        article.title = title.to_string();
        article.body = body.to_string();
        article.slug = new_slug;

        let updated = store
            .update_article(tx, &article)
            .await
            .map_err(|err| conflict_on_unique(err, &article.slug))?;
        if !updated {
            return Err(ContentError::NotFound("article", slug.to_string()));
        }
        Ok(article)
    }

    async fn delete_in(
        &self,
        store: &S,
        tx: &mut S::Tx,
        slug: &str,
        author: UserId,
    ) -> ContentResult<CascadeReport> {
        let article = owned_article(store, tx, slug, author).await?;
        match self.engine.execute(store, tx, article.id.into()).await? {
            CascadeOutcome::Deleted(report) => Ok(report),
            CascadeOutcome::NothingToDelete => Err(ContentError::NotFound("article", slug.to_string())),
        }
    }

    async fn thread_in(&self, store: &S, tx: &mut S::Tx, slug: &str) -> ContentResult<ArticleThread> {
        let article = store
            .find_article_by_slug(tx, slug)
            .await?
            .ok_or_else(|| ContentError::NotFound("article", slug.to_string()))?;
        let likes = store.likes_by_target(tx, article.id.into()).await?;

        let mut comments = Vec::with_capacity(article.comments.len());
        for &id in &article.comments {
            let Some(comment) = store.find_comment(tx, id).await? else {
                continue;
            };
            let likes = store.likes_by_target(tx, ContentTarget::Comment(id)).await?;
            comments.push(CommentView { comment, likes });
        }

        Ok(ArticleThread {
            article,
            likes,
            comments,
        })
    }
}

/// The article at `slug` if `author` wrote it. Missing and foreign articles
/// look the same to the caller.
async fn owned_article<S: ContentStore>(
    store: &S,
    tx: &mut S::Tx,
    slug: &str,
    author: UserId,
) -> ContentResult<Article> {
    store
        .find_article_by_slug(tx, slug)
        .await?
        .filter(|article| article.author == author)
        .ok_or_else(|| ContentError::NotFound("article", slug.to_string()))
}

fn slug_taken(slug: &str) -> ContentError {
    ContentError::Conflict(format!("slug '{slug}' is already taken"))
}

fn conflict_on_unique(err: StoreError, slug: &str) -> ContentError {
    match err {
        StoreError::UniqueViolation(_) => slug_taken(slug),
        other => other.into(),
    }
}
