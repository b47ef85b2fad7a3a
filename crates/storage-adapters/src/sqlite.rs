//! # SQLite content store
//!
//! Maps the relational model onto the domain models. Ids are stored as UUID
//! blobs, the polymorphic target as a `(content_type, target_id)` column pair,
//! and back-reference sets as JSON arrays. Slug and `(voter, target_id)`
//! uniqueness are table constraints, so a racing duplicate fails at insert
//! time no matter what the caller checked beforehand.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Article, ArticleId, Comment, CommentId, ContentStore, ContentTarget, ContentType, Like, LikeId,
    StoreError, StoreResult, UserId, Vote,
};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{RowCounter, RowCounts};

const SCHEMA: &str = include_str!("../migrations/0001_content.sql");

/// How long a connection waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Takes the write lock when the transaction opens. A deferred `BEGIN` would
/// let two readers race to upgrade and fail the loser with `SQLITE_BUSY`.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

const ARTICLE_COLUMNS: &str = "id, author, title, slug, body, published_at, comment_ids, like_ids";
const COMMENT_COLUMNS: &str =
    "id, author, content_type, target_id, parent_id, body, posted_at, edited_at, like_ids";
const LIKE_COLUMNS: &str = "id, voter, content_type, target_id, value, liked_at";

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    ///
    /// An in-memory database lives inside a single connection, so the pool is
    /// pinned to one connection that never expires. A file database may use
    /// several connections; their transactions queue on the write lock.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await.map_err(db_err)?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(db_err)?;
        info!(in_memory, "sqlite content store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> StoreResult<Uuid> {
    Uuid::from_slice(blob).map_err(|err| StoreError::Corrupt(format!("invalid uuid blob: {err}")))
}

fn db_err(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::UniqueViolation(db.message().to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn uuid_column(row: &SqliteRow, column: &str) -> StoreResult<Uuid> {
    let blob: Vec<u8> = row.try_get(column).map_err(db_err)?;
    blob_to_uuid(&blob)
}

fn target_columns(row: &SqliteRow) -> StoreResult<ContentTarget> {
    let kind: String = row.try_get("content_type").map_err(db_err)?;
    let kind = ContentType::from_str(&kind).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    Ok(ContentTarget::from_parts(kind, uuid_column(row, "target_id")?))
}

fn to_json<T: Serialize>(ids: &[T]) -> StoreResult<String> {
    serde_json::to_string(ids).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> StoreResult<Vec<T>> {
    let raw: String = row.try_get(column).map_err(db_err)?;
    serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt(format!("{column}: {err}")))
}

fn article_from_row(row: &SqliteRow) -> StoreResult<Article> {
    Ok(Article {
        id: ArticleId(uuid_column(row, "id")?),
        author: UserId(uuid_column(row, "author")?),
        title: row.try_get("title").map_err(db_err)?,
        slug: row.try_get("slug").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        published_at: row.try_get("published_at").map_err(db_err)?,
        comments: json_column(row, "comment_ids")?,
        likes: json_column(row, "like_ids")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> StoreResult<Comment> {
    let parent: Option<Vec<u8>> = row.try_get("parent_id").map_err(db_err)?;
    Ok(Comment {
        id: CommentId(uuid_column(row, "id")?),
        author: UserId(uuid_column(row, "author")?),
        target: target_columns(row)?,
        body: row.try_get("body").map_err(db_err)?,
        posted_at: row.try_get("posted_at").map_err(db_err)?,
        edited_at: row.try_get::<Option<DateTime<Utc>>, _>("edited_at").map_err(db_err)?,
        likes: json_column(row, "like_ids")?,
        parent: parent.as_deref().map(blob_to_uuid).transpose()?.map(CommentId),
    })
}

fn like_from_row(row: &SqliteRow) -> StoreResult<Like> {
    let value: i64 = row.try_get("value").map_err(db_err)?;
    Ok(Like {
        id: LikeId(uuid_column(row, "id")?),
        voter: UserId(uuid_column(row, "voter")?),
        target: target_columns(row)?,
        value: Vote::try_from(value).map_err(|err| StoreError::Corrupt(err.to_string()))?,
        liked_at: row.try_get("liked_at").map_err(db_err)?,
    })
}

fn collect<T>(rows: Vec<SqliteRow>, map: fn(&SqliteRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl RowCounter for SqliteContentStore {
    async fn row_counts(&self) -> StoreResult<RowCounts> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM articles) AS articles, \
                    (SELECT COUNT(*) FROM comments) AS comments, \
                    (SELECT COUNT(*) FROM likes) AS likes",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let count = |column: &str| -> StoreResult<usize> {
            let value: i64 = row.try_get(column).map_err(db_err)?;
            usize::try_from(value).map_err(|err| StoreError::Corrupt(err.to_string()))
        };
        Ok(RowCounts {
            articles: count("articles")?,
            comments: count("comments")?,
            likes: count("likes")?,
        })
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    type Tx = Transaction<'static, Sqlite>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        self.pool.begin_with(BEGIN_WRITE).await.map_err(db_err)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await.map_err(db_err)?;
        debug!("sqlite transaction committed");
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.rollback().await.map_err(db_err)
    }

    async fn exists(&self, tx: &mut Self::Tx, target: ContentTarget) -> StoreResult<bool> {
        let sql = match target {
            ContentTarget::Article(_) => "SELECT 1 FROM articles WHERE id = ?",
            ContentTarget::Comment(_) => "SELECT 1 FROM comments WHERE id = ?",
        };
        let row = sqlx::query(sql)
            .bind(uuid_to_blob(target.target_id()))
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn insert_article(&self, tx: &mut Self::Tx, article: &Article) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO articles (id, author, title, slug, body, published_at, comment_ids, like_ids) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(article.id.0))
        .bind(uuid_to_blob(article.author.0))
        .bind(&article.title)
        .bind(&article.slug)
        .bind(&article.body)
        .bind(article.published_at)
        .bind(to_json(&article.comments)?)
        .bind(to_json(&article.likes)?)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_article(&self, tx: &mut Self::Tx, id: ArticleId) -> StoreResult<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
            .bind(uuid_to_blob(id.0))
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn find_article_by_slug(&self, tx: &mut Self::Tx, slug: &str) -> StoreResult<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn list_articles(&self, tx: &mut Self::Tx) -> StoreResult<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY published_at DESC, id DESC"
        ))
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        collect(rows, article_from_row)
    }

    async fn update_article(&self, tx: &mut Self::Tx, article: &Article) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE articles SET author = ?, title = ?, slug = ?, body = ?, published_at = ?, \
             comment_ids = ?, like_ids = ? WHERE id = ?",
        )
        .bind(uuid_to_blob(article.author.0))
        .bind(&article.title)
        .bind(&article.slug)
        .bind(&article.body)
        .bind(article.published_at)
        .bind(to_json(&article.comments)?)
        .bind(to_json(&article.likes)?)
        .bind(uuid_to_blob(article.id.0))
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_article(&self, tx: &mut Self::Tx, id: ArticleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(uuid_to_blob(id.0))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&self, tx: &mut Self::Tx, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, author, content_type, target_id, parent_id, body, posted_at, edited_at, like_ids) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(comment.id.0))
        .bind(uuid_to_blob(comment.author.0))
        .bind(comment.target.content_type().as_str())
        .bind(uuid_to_blob(comment.target.target_id()))
        .bind(comment.parent.map(|parent| uuid_to_blob(parent.0)))
        .bind(&comment.body)
        .bind(comment.posted_at)
        .bind(comment.edited_at)
        .bind(to_json(&comment.likes)?)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_comment(&self, tx: &mut Self::Tx, id: CommentId) -> StoreResult<Option<Comment>> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"))
            .bind(uuid_to_blob(id.0))
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn update_comment(&self, tx: &mut Self::Tx, comment: &Comment) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE comments SET author = ?, content_type = ?, target_id = ?, parent_id = ?, body = ?, \
             posted_at = ?, edited_at = ?, like_ids = ? WHERE id = ?",
        )
        .bind(uuid_to_blob(comment.author.0))
        .bind(comment.target.content_type().as_str())
        .bind(uuid_to_blob(comment.target.target_id()))
        .bind(comment.parent.map(|parent| uuid_to_blob(parent.0)))
        .bind(&comment.body)
        .bind(comment.posted_at)
        .bind(comment.edited_at)
        .bind(to_json(&comment.likes)?)
        .bind(uuid_to_blob(comment.id.0))
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_comment(&self, tx: &mut Self::Tx, id: CommentId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(uuid_to_blob(id.0))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn comments_by_target(
        &self,
        tx: &mut Self::Tx,
        target: ContentTarget,
    ) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE target_id = ? AND content_type = ? \
             ORDER BY posted_at ASC, id ASC"
        ))
        .bind(uuid_to_blob(target.target_id()))
        .bind(target.content_type().as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        collect(rows, comment_from_row)
    }

    async fn replies_to(&self, tx: &mut Self::Tx, parent: CommentId) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE parent_id = ? ORDER BY posted_at ASC, id ASC"
        ))
        .bind(uuid_to_blob(parent.0))
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        collect(rows, comment_from_row)
    }

    async fn insert_like(&self, tx: &mut Self::Tx, like: &Like) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO likes (id, voter, content_type, target_id, value, liked_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(like.id.0))
        .bind(uuid_to_blob(like.voter.0))
        .bind(like.target.content_type().as_str())
        .bind(uuid_to_blob(like.target.target_id()))
        .bind(like.value.value())
        .bind(like.liked_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_like(&self, tx: &mut Self::Tx, id: LikeId) -> StoreResult<Option<Like>> {
        let row = sqlx::query(&format!("SELECT {LIKE_COLUMNS} FROM likes WHERE id = ?"))
            .bind(uuid_to_blob(id.0))
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(like_from_row).transpose()
    }

    async fn find_like_by_voter(
        &self,
        tx: &mut Self::Tx,
        voter: UserId,
        target: ContentTarget,
    ) -> StoreResult<Option<Like>> {
        let row = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE voter = ? AND target_id = ? AND content_type = ?"
        ))
        .bind(uuid_to_blob(voter.0))
        .bind(uuid_to_blob(target.target_id()))
        .bind(target.content_type().as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        row.as_ref().map(like_from_row).transpose()
    }

    async fn delete_like(&self, tx: &mut Self::Tx, id: LikeId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE id = ?")
            .bind(uuid_to_blob(id.0))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn likes_by_target(&self, tx: &mut Self::Tx, target: ContentTarget) -> StoreResult<Vec<Like>> {
        let rows = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE target_id = ? AND content_type = ? \
             ORDER BY liked_at ASC, id ASC"
        ))
        .bind(uuid_to_blob(target.target_id()))
        .bind(target.content_type().as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        collect(rows, like_from_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::assert_err;

    async fn store() -> SqliteContentStore {
        SqliteContentStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    async fn file_store(dir: &tempfile::TempDir, connections: u32) -> SqliteContentStore {
        let url = format!("sqlite://{}", dir.path().join("content.db").display());
        SqliteContentStore::connect(&url, connections).await.unwrap()
    }

    #[tokio::test]
    async fn article_round_trips_through_its_row() {
        let store = store().await;
        let mut article = Article::new(UserId::generate(), "Stored as rows", "body");
        article.comments.push(CommentId::generate());

        let mut tx = store.begin().await.unwrap();
        store.insert_article(&mut tx, &article).await.unwrap();
        let found = store.find_article(&mut tx, article.id).await.unwrap().unwrap();
        store.commit(tx).await.unwrap();

        assert_eq!(found.id, article.id);
        assert_eq!(found.slug, "stored-as-rows");
        assert_eq!(found.comments, article.comments);
    }

    #[tokio::test]
    async fn reply_keeps_target_and_parent() {
        let store = store().await;
        let target = ContentTarget::Article(ArticleId::generate());
        let parent = Comment::new(UserId::generate(), target, "parent", None);
        let reply = Comment::new(UserId::generate(), target, "reply", Some(parent.id));

        let mut tx = store.begin().await.unwrap();
        store.insert_comment(&mut tx, &parent).await.unwrap();
        store.insert_comment(&mut tx, &reply).await.unwrap();

        let replies = store.replies_to(&mut tx, parent.id).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent, Some(parent.id));
        assert_eq!(replies[0].target, target);
        assert_eq!(store.comments_by_target(&mut tx, target).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unique_constraint_rejects_second_vote() {
        let store = store().await;
        let voter = UserId::generate();
        let target = ContentTarget::Comment(CommentId::generate());

        let mut tx = store.begin().await.unwrap();
        store.insert_like(&mut tx, &Like::new(voter, target, Vote::Up)).await.unwrap();
        let err = assert_err!(store.insert_like(&mut tx, &Like::new(voter, target, Vote::Down)).await);
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn rolled_back_writes_are_gone() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        store
            .insert_article(&mut tx, &Article::new(UserId::generate(), "Never", "body"))
            .await
            .unwrap();
        store.rollback(tx).await.unwrap();

        assert_eq!(store.row_counts().await.unwrap(), RowCounts::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_transaction_waits_for_the_open_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(&dir, 2).await);
        let voter = UserId::generate();
        let target = ContentTarget::Article(ArticleId::generate());

        let mut first = store.begin().await.unwrap();
        store
            .insert_like(&mut first, &Like::new(voter, target, Vote::Up))
            .await
            .unwrap();

        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut tx = store.begin().await?;
                let seen = store.find_like_by_voter(&mut tx, voter, target).await?;
                store.rollback(tx).await?;
                StoreResult::Ok(seen.is_some())
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.commit(first).await.unwrap();

        assert!(second.await.unwrap().unwrap());
    }
}
