use std::str::FromStr;

use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteError, SqlitePoolOptions};
use sqlx::{PgPool, Postgres, Sqlite, SqlitePool, Transaction, query};

use crate::config::DatabaseConfig;

/// Failure taxonomy of the relational store.
///
/// Driver error codes are folded into these variants here so nothing above
/// this module needs to know which database is in use.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("transaction timed out: {0}")]
    Timeout(String),
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {message}")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },
    #[error("database error: {0}")]
    Other(String),
}

/// PostgreSQL SQLSTATEs that indicate a transient write conflict.
const PG_CONFLICT_CODES: &[&str] = &["40001", "40P01", "55P03"];
/// PostgreSQL statement timeout (query_canceled).
const PG_TIMEOUT_CODE: &str = "57014";
/// SQLite primary result codes SQLITE_BUSY and SQLITE_LOCKED.
const SQLITE_BUSY: u32 = 5;
const SQLITE_LOCKED: u32 = 6;

fn is_sqlite_busy(code: &str) -> bool {
    code.parse::<u32>()
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut => {
                StoreError::Timeout("timed out waiting for a pooled connection".to_string())
            }
            sqlx::Error::Database(db_err) => {
                if matches!(db_err.kind(), ErrorKind::UniqueViolation) {
                    return StoreError::UniqueViolation {
                        constraint: db_err.constraint().map(str::to_string),
                        message: db_err.message().to_string(),
                    };
                }

                let message = db_err.message().to_string();
                let code = db_err.code();
                if db_err.try_downcast_ref::<SqliteError>().is_some() {
                    return match code.as_deref() {
                        Some(code) if is_sqlite_busy(code) => StoreError::Conflict(message),
                        _ => StoreError::Other(message),
                    };
                }
                match code.as_deref() {
                    Some(code) if PG_CONFLICT_CODES.contains(&code) => StoreError::Conflict(message),
                    Some(PG_TIMEOUT_CODE) => StoreError::Timeout(message),
                    _ => StoreError::Other(message),
                }
            }
            other => StoreError::Other(other.to_string()),
        }
    }
}

/// Database provides access to the relational store (PostgreSQL or SQLite).
#[derive(Clone, Debug)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// An open transaction on either backend.
#[derive(Debug)]
pub enum DbTx {
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

/// Run `$body` with `$conn` bound to the transaction's connection.
macro_rules! on_tx {
    ($tx:expr, $conn:ident => $body:expr) => {
        match $tx {
            $crate::database::DbTx::Postgres(tx) => {
                let $conn = &mut **tx;
                $body
            }
            $crate::database::DbTx::Sqlite(tx) => {
                let $conn = &mut **tx;
                $body
            }
        }
    };
}

/// Run `$body` with `$conn` bound to the pool.
macro_rules! on_pool {
    ($db:expr, $conn:ident => $body:expr) => {
        match $db {
            $crate::database::Database::Postgres(pool) => {
                let $conn = pool;
                $body
            }
            $crate::database::Database::Sqlite(pool) => {
                let $conn = pool;
                $body
            }
        }
    };
}

pub(crate) use on_pool;
pub(crate) use on_tx;

// Timestamps are RFC 3339 text on both backends so rows decode identically.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        cover_image TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CONSTRAINT categories_name_unique UNIQUE (tenant_id, name)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        category_id TEXT,
        title TEXT NOT NULL,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        cover_image TEXT,
        published BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CONSTRAINT posts_name_unique UNIQUE (tenant_id, name)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        username TEXT NOT NULL,
        display_name TEXT NOT NULL,
        bio TEXT,
        avatar_url TEXT,
        password_changed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CONSTRAINT users_username_unique UNIQUE (tenant_id, username)
    )"#,
    "CREATE INDEX IF NOT EXISTS posts_category_idx ON posts (tenant_id, category_id)",
];

impl Database {
    /// Connect to the configured database and initialize the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let dsn = config.dsn.as_str();
        log::info!("Connecting to database with DSN: {dsn}");

        let database = if dsn.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(dsn)?
                .create_if_missing(true)
                .busy_timeout(config.max_wait);

            let in_memory = dsn.contains(":memory:");
            if !in_memory {
                if let Some(parent) = options.get_filename().parent() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }

            // An in-memory database only exists on its one connection.
            let mut pool_options = SqlitePoolOptions::new().acquire_timeout(config.max_wait);
            pool_options = if in_memory {
                pool_options
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                pool_options.max_connections(config.max_connections)
            };
            let pool = pool_options
                .connect_with(options)
                .await
                .map_err(|e| {
                    log::error!("Failed to connect to SQLite database with DSN '{dsn}': {e}");
                    e
                })?;
            Database::Sqlite(pool)
        } else {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.max_wait)
                .connect(dsn)
                .await
                .map_err(|e| {
                    log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                    e
                })?;
            Database::Postgres(pool)
        };

        log::info!("Database connection established successfully");
        database.init().await.map_err(|e| {
            log::error!("Failed to initialize database schema: {e}");
            e
        })?;
        log::info!("Database schema initialized successfully");
        Ok(database)
    }

    /// Shortcut for an in-memory SQLite database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    /// Initialize tables if they do not exist.
    async fn init(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            on_pool!(self, conn => query(statement).execute(conn).await.map(|_| ()))?;
        }
        Ok(())
    }

    pub async fn begin(&self) -> Result<DbTx, sqlx::Error> {
        Ok(match self {
            Database::Postgres(pool) => DbTx::Postgres(pool.begin().await?),
            Database::Sqlite(pool) => DbTx::Sqlite(pool.begin().await?),
        })
    }

    pub async fn close(&self) {
        on_pool!(self, pool => pool.close().await)
    }
}

impl DbTx {
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            DbTx::Postgres(tx) => tx.commit().await,
            DbTx::Sqlite(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            DbTx::Postgres(tx) => tx.rollback().await,
            DbTx::Sqlite(tx) => tx.rollback().await,
        }
    }
}
