//! `seed` - fills the configured content store with a demo data set.
//!
//! Every write goes through the content services, so the run doubles as a
//! smoke test of comment threading, voting and (with `seed.purge_first`)
//! cascade deletion against a real backend.

use std::sync::Arc;

use anyhow::Context;
use configs::{AppConfig, LogConfig, LogFormat, StoreBackend};
use domains::{Article, ContentError, ContentStore, ContentTarget, UserId, Vote};
use services::{CascadeLimits, ContentServices};
use storage_adapters::{MemoryContentStore, RowCounter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TITLES: &[&str] = &[
    "Éloge de la lenteur",
    "Rust & the borrow checker",
    "Notes from the field",
    "Crème brûlée, a field guide",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.log);

    let limits = CascadeLimits {
        max_entities: config.cascade.max_entities,
    };

    match config.database.backend {
        StoreBackend::Memory => run(MemoryContentStore::new(), &config, limits).await,
        StoreBackend::Sqlite => run_sqlite(&config, limits).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

#[cfg(feature = "db-sqlite")]
async fn run_sqlite(config: &AppConfig, limits: CascadeLimits) -> anyhow::Result<()> {
    use secrecy::ExposeSecret;
    use storage_adapters::SqliteContentStore;

    let store = SqliteContentStore::connect(
        config.database.url.expose_secret(),
        config.database.max_connections,
    )
    .await
    .context("opening sqlite store")?;
    run(store, config, limits).await
}

#[cfg(not(feature = "db-sqlite"))]
async fn run_sqlite(_config: &AppConfig, _limits: CascadeLimits) -> anyhow::Result<()> {
    anyhow::bail!("the sqlite backend requires the `db-sqlite` feature")
}

async fn run<S>(store: S, config: &AppConfig, limits: CascadeLimits) -> anyhow::Result<()>
where
    S: ContentStore + RowCounter,
{
    let store = Arc::new(store);
    let services = ContentServices::new(Arc::clone(&store), limits);
    let users = [UserId::generate(), UserId::generate(), UserId::generate()];

    let mut seeded = Vec::new();
    for n in 0..config.seed.articles {
        match seed_article(&services, n, &users).await {
            Ok(article) => seeded.push(article),
            Err(ContentError::Conflict(reason)) => warn!(%reason, "article skipped"),
            Err(err) => return Err(err.into()),
        }
    }

    if config.seed.purge_first {
        if let Some(first) = seeded.first() {
            let report = services.articles.delete_article(&first.slug, first.author).await?;
            info!(
                slug = %first.slug,
                comments = report.comments_deleted.len(),
                likes = report.likes_deleted.len(),
                "purged first article"
            );
        }
    }

    let counts = store.row_counts().await?;
    info!(
        articles = counts.articles,
        comments = counts.comments,
        likes = counts.likes,
        "seed complete"
    );
    Ok(())
}

/// One article with a short thread: a comment, a reply to it, a comment on
/// the comment, and votes on all three levels.
async fn seed_article<S: ContentStore>(
    services: &ContentServices<S>,
    n: usize,
    users: &[UserId; 3],
) -> Result<Article, ContentError> {
    let [alice, bob, carol] = *users;
    let title = format!("{} {}", TITLES[n % TITLES.len()], n + 1);
    let article = services
        .articles
        .create_article(alice, &title, "Lorem ipsum dolor sit amet.")
        .await?;
    let on_article = ContentTarget::Article(article.id);

    let first = services
        .comments
        .create_comment(bob, on_article, "First!", None)
        .await?;
    services
        .comments
        .create_comment(carol, on_article, "Replying to the first one.", Some(first.id))
        .await?;
    let aside = services
        .comments
        .create_comment(alice, first.id.into(), "A note on this comment.", None)
        .await?;

    services.likes.add_like(bob, on_article, Vote::Up).await?;
    services.likes.add_like(carol, on_article, Vote::Down).await?;
    services.likes.add_like(alice, first.id.into(), Vote::Up).await?;
    services.likes.add_like(bob, aside.id.into(), Vote::Up).await?;

    info!(slug = %article.slug, "article seeded");
    Ok(article)
}
