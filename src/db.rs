use std::{fmt, str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    migrate::MigrateError,
    postgres::PgPoolOptions,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    PgPool, SqlitePool,
};
use tracing::debug;

use crate::config::{ConfigError, DatabaseConfig};
use crate::users::repo::{PgUserRepository, SqliteUserRepository, UserRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Picks the dialect from the url scheme.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(ConfigError::UnsupportedDialect(scheme.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        })
    }
}

/// How long a SQLite writer waits for another invocation's write lock.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Opens a pool for the configured url. The url itself is never logged.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Database> {
    let url = config.url()?;
    let dialect = Dialect::from_url(url)?;
    debug!(%dialect, "database type");

    let max_connections = config.max_connections.max(1);
    let db = match dialect {
        Dialect::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .context("connect to database")?;
            Database::Postgres(pool)
        }
        Dialect::Sqlite => {
            let options = SqliteConnectOptions::from_str(url)
                .context("parse sqlite url")?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(SQLITE_BUSY_TIMEOUT)
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await
                .context("connect to database")?;
            Database::Sqlite(pool)
        }
    };

    debug!(%dialect, "connected to database");
    Ok(db)
}

impl Database {
    pub fn dialect(&self) -> Dialect {
        match self {
            Database::Postgres(_) => Dialect::Postgres,
            Database::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub async fn migrate(&self) -> Result<(), MigrateError> {
        match self {
            Database::Postgres(pool) => sqlx::migrate!("./migrations/postgres").run(pool).await,
            Database::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite").run(pool).await,
        }
    }

    pub fn user_repository(&self) -> Box<dyn UserRepository> {
        match self {
            Database::Postgres(pool) => Box::new(PgUserRepository::new(pool.clone())),
            Database::Sqlite(pool) => Box::new(SqliteUserRepository::new(pool.clone())),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    use super::{connect, Database};
    use crate::config::DatabaseConfig;

    /// Opens a separate single-connection pool on a database file, the way
    /// another invocation of the tool would.
    pub async fn connect_file_pool(path: &Path) -> SqlitePool {
        let config = DatabaseConfig {
            url: Some(format!("sqlite://{}", path.display())),
            max_connections: 1,
            migrate: false,
        };
        match connect(&config).await.unwrap() {
            Database::Sqlite(pool) => pool,
            Database::Postgres(_) => panic!("sqlite url opened a postgres pool"),
        }
    }

    /// Single-connection in-memory pool; every connection would get its own database otherwise.
    pub async fn create_unmigrated_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    pub async fn create_test_pool() -> SqlitePool {
        let pool = create_unmigrated_pool().await;
        sqlx::migrate!("./migrations/sqlite").run(&pool).await.unwrap();
        pool
    }

    pub async fn count_users(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
