use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{OfferRow, ProductRow, RequestRow};
use super::postgres::PgSession;
use super::sqlite::SqliteSession;
use super::{Session, SessionFactory, StoreError};
use crate::model::{JobStatus, Offer, ProductSnapshot, ScrapeRequest};

/// Connection pool for one of the supported backends, picked from the URL
/// scheme (`sqlite:` or `postgres:`/`postgresql:`).
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if database_url.starts_with("sqlite:") {
            let pool = init_sqlite_pool(database_url).await?;
            info!("connected to sqlite");
            return Ok(Database::Sqlite(pool));
        }
        if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(database_url)
                .await?;
            info!("connected to postgres");
            return Ok(Database::Postgres(pool));
        }
        Err(StoreError::UnsupportedUrl(redact(database_url)))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        match self {
            Database::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite").run(pool).await?,
            Database::Postgres(pool) => sqlx::migrate!("./migrations/postgres").run(pool).await?,
        }
        Ok(())
    }

    /// Create a pending scrape request. Called by the intake path only.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn insert_request(&self, url: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        match self {
            Database::Sqlite(pool) => {
                sqlx::query(
                    "INSERT INTO scrape_requests (id, url, status, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(id)
                .bind(url)
                .bind(JobStatus::Pending.as_str())
                .bind(now)
                .execute(pool)
                .await?;
            }
            Database::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO scrape_requests (id, url, status, created_at) VALUES ($1, $2, $3, $4)",
                )
                .bind(id)
                .bind(url)
                .bind(JobStatus::Pending.as_str())
                .bind(now)
                .execute(pool)
                .await?;
            }
        }
        Ok(id)
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Option<ScrapeRequest>, StoreError> {
        let row = match self {
            Database::Sqlite(pool) => {
                sqlx::query_as::<_, RequestRow>(
                    "SELECT id, url, status, created_at FROM scrape_requests WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
            Database::Postgres(pool) => {
                sqlx::query_as::<_, RequestRow>(
                    "SELECT id, url, status, created_at FROM scrape_requests WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
        };
        row.map(ScrapeRequest::try_from).transpose()
    }

    /// Read side: every stored product, newest update first. Never touches job state.
    pub async fn list_products(&self) -> Result<Vec<ProductSnapshot>, StoreError> {
        const SQL: &str = "SELECT id, store, store_product_id, name, image_url, url \
                           FROM products ORDER BY updated_at DESC, name ASC";
        let rows = match self {
            Database::Sqlite(pool) => sqlx::query_as::<_, ProductRow>(SQL).fetch_all(pool).await?,
            Database::Postgres(pool) => sqlx::query_as::<_, ProductRow>(SQL).fetch_all(pool).await?,
        };
        Ok(rows.into_iter().map(ProductSnapshot::from).collect())
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<ProductSnapshot>, StoreError> {
        let row = match self {
            Database::Sqlite(pool) => {
                sqlx::query_as::<_, ProductRow>(
                    "SELECT id, store, store_product_id, name, image_url, url FROM products WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
            Database::Postgres(pool) => {
                sqlx::query_as::<_, ProductRow>(
                    "SELECT id, store, store_product_id, name, image_url, url FROM products WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
        };
        Ok(row.map(ProductSnapshot::from))
    }

    /// Read side: price history for one product, oldest first.
    pub async fn list_offers(&self, product_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        let rows = match self {
            Database::Sqlite(pool) => {
                sqlx::query_as::<_, OfferRow>(
                    "SELECT id, product_id, price, currency, size, color, availability, scraped_at \
                     FROM prices WHERE product_id = ? ORDER BY scraped_at ASC",
                )
                .bind(product_id)
                .fetch_all(pool)
                .await?
            }
            Database::Postgres(pool) => {
                sqlx::query_as::<_, OfferRow>(
                    "SELECT id, product_id, price, currency, size, color, availability, scraped_at \
                     FROM prices WHERE product_id = $1 ORDER BY scraped_at ASC",
                )
                .bind(product_id)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Offer::from).collect())
    }
}

#[async_trait]
impl SessionFactory for Database {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError> {
        match self {
            Database::Sqlite(pool) => Ok(Box::new(SqliteSession::new(pool.begin().await?))),
            Database::Postgres(pool) => Ok(Box::new(PgSession::new(pool.begin().await?))),
        }
    }
}

async fn init_sqlite_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    // Every connection to `sqlite::memory:` is a separate database, so keep
    // exactly one alive for the lifetime of the pool.
    let pool = if normalized.starts_with("sqlite::memory") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

/// Drop credentials before a URL ends up in an error message.
fn redact(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => url.to_string(),
    }
}
