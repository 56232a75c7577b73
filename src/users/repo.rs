use async_trait::async_trait;
use sqlx::{Executor, PgPool, SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::users::error::SaveError;
use crate::users::repo_types::{StoredUser, UserRecord};

/// Persistence boundary for new users.
///
/// `save` checks for an existing email and inserts inside one transaction.
/// Two invocations racing on the same email end with one saved user and one
/// [`SaveError::DuplicateEmail`]. On Postgres the unique index on
/// `users.email` makes the loser's insert fail; on SQLite the loser waits for
/// the write lock and then finds the row.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, record: &UserRecord) -> Result<StoredUser, SaveError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, sqlx::Error>;
}

fn map_insert_error(e: sqlx::Error) -> SaveError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            SaveError::DuplicateEmail
        }
        _ => SaveError::Storage(e),
    }
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self, record), fields(email = %record.email))]
    async fn save(&self, record: &UserRecord) -> Result<StoredUser, SaveError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
            .bind(&record.email)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(id) = existing {
            warn!(existing_id = id, "email already registered");
            return Err(SaveError::DuplicateEmail);
        }

        let user = sqlx::query_as::<_, StoredUser>(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, group_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, first_name, last_name, group_id, created_at
            "#,
        )
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(record.group_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        tx.commit().await.map_err(map_insert_error)?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, sqlx::Error> {
        sqlx::query_as::<_, StoredUser>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, group_id, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// Runs inside BEGIN IMMEDIATE, so no other writer can slip in between the
// existence check and the insert.
async fn insert_if_absent(
    conn: &mut SqliteConnection,
    record: &UserRecord,
) -> Result<StoredUser, SaveError> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(&record.email)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        warn!(existing_id = id, "email already registered");
        return Err(SaveError::DuplicateEmail);
    }

    sqlx::query_as::<_, StoredUser>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, group_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, email, password_hash, first_name, last_name, group_id, created_at
        "#,
    )
    .bind(&record.email)
    .bind(&record.password_hash)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(record.group_id)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(&mut *conn)
    .await
    .map_err(map_insert_error)
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    /// A deferred transaction that reads first cannot upgrade to a write lock
    /// while another connection holds one; SQLite fails it with SQLITE_BUSY
    /// instead of waiting. `BEGIN IMMEDIATE` takes the lock up front and waits
    /// on the busy timeout, so the second writer sees the committed row.
    #[instrument(skip(self, record), fields(email = %record.email))]
    async fn save(&self, record: &UserRecord) -> Result<StoredUser, SaveError> {
        let mut conn = self.pool.acquire().await?;
        (&mut *conn).execute("BEGIN IMMEDIATE").await?;

        let result = insert_if_absent(&mut conn, record).await;

        let finish = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = (&mut *conn).execute(finish).await {
            // transaction state unknown, keep this connection out of the pool
            drop(conn.detach());
            return Err(match result {
                Ok(_) => map_insert_error(e),
                Err(original) => original,
            });
        }
        result
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, sqlx::Error> {
        sqlx::query_as::<_, StoredUser>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, group_id, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }
}
