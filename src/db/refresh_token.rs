//! Refresh token storage for session tracking, rotation and revocation.
//!
//! Every issued refresh token is one row. Rows sharing a `family` form the
//! rotation chain of a single login session. Access tokens are stateless and
//! never stored.

use sqlx::sqlite::{SqliteArguments, SqlitePool};
use sqlx::{Sqlite, query::Query};

use super::error::StoreError;

/// A stored refresh token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub lookup_hash: String,
    pub family: String,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub replaced_by_hash: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

impl RefreshTokenRecord {
    /// A spent record has already been rotated away.
    pub fn is_spent(&self) -> bool {
        self.replaced_by_hash.is_some()
    }
}

/// Fields for inserting a refresh token record.
#[derive(Debug, Clone, Copy)]
pub struct NewRefreshToken<'a> {
    pub user_id: i64,
    pub token_hash: &'a str,
    pub lookup_hash: &'a str,
    pub family: &'a str,
    pub expires_at: i64,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

const RECORD_COLUMNS: &str = "id, user_id, token_hash, lookup_hash, family, expires_at, \
     revoked_at, replaced_by_hash, ip_address, user_agent, created_at";

fn insert_query<'a>(new: NewRefreshToken<'a>, now: i64) -> Query<'a, Sqlite, SqliteArguments<'a>> {
    sqlx::query(
        "INSERT INTO refresh_tokens \
         (user_id, token_hash, lookup_hash, family, expires_at, ip_address, user_agent, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.token_hash)
    .bind(new.lookup_hash)
    .bind(new.family)
    .bind(new.expires_at)
    .bind(new.ip_address)
    .bind(new.user_agent)
    .bind(now)
}

/// Store for managing refresh token records.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new refresh token record. Returns the record ID.
    pub async fn create(&self, new: NewRefreshToken<'_>, now: i64) -> Result<i64, StoreError> {
        let result = insert_query(new, now).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// The unrevoked, unexpired record of `family` with this lookup digest.
    /// Spent records are included so replays can be recognized.
    pub async fn find_active_by_lookup(
        &self,
        family: &str,
        lookup_hash: &str,
        now: i64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row: Option<RefreshTokenRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens \
             WHERE lookup_hash = ? AND family = ? AND revoked_at IS NULL AND expires_at > ?"
        ))
        .bind(lookup_hash)
        .bind(family)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Number of unrevoked, unexpired records in a family, spent or not.
    pub async fn count_active_in_family(&self, family: &str, now: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens \
             WHERE family = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(family)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Replace `current_id` with a new record in the same transaction.
    ///
    /// The parent is only marked when it is still unreplaced, unrevoked and
    /// unexpired at write time. Returns `None` when that condition fails,
    /// which means another rotation (or a revocation) won the race.
    pub async fn rotate(
        &self,
        current_id: i64,
        child: NewRefreshToken<'_>,
        now: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The conditional write comes first so concurrent rotations queue on
        // the write lock instead of racing on a stale read.
        let marked = sqlx::query(
            "UPDATE refresh_tokens SET replaced_by_hash = ? \
             WHERE id = ? AND replaced_by_hash IS NULL AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(child.token_hash)
        .bind(current_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = insert_query(child, now).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(inserted.last_insert_rowid()))
    }

    /// Revoke one record. Returns whether anything changed.
    pub async fn revoke(&self, id: i64, now: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every record in a family.
    pub async fn revoke_family(&self, family: &str, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE family = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(family)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Revoke a family only if it belongs to `user_id`.
    pub async fn revoke_family_for_user(
        &self,
        user_id: i64,
        family: &str,
        now: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? \
             WHERE user_id = ? AND family = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .bind(family)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Revoke every record owned by a user (logout everywhere).
    pub async fn revoke_all_for_user(&self, user_id: i64, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// The live record of every session a user has, newest first.
    pub async fn list_sessions_by_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows: Vec<RefreshTokenRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens \
             WHERE user_id = ? AND revoked_at IS NULL AND replaced_by_hash IS NULL AND expires_at > ? \
             ORDER BY id DESC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of records in a family that could still authorize a refresh.
    pub async fn count_live_in_family(&self, family: &str, now: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens \
             WHERE family = ? AND revoked_at IS NULL AND replaced_by_hash IS NULL AND expires_at > ?",
        )
        .bind(family)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Delete all expired records.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
