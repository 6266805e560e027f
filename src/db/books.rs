//! Book catalog storage.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::error::{StoreError, is_unique_violation};

#[derive(Clone)]
pub struct BookStore {
    pool: SqlitePool,
}

/// A catalog entry. `uuid` is the public identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(rename = "id")]
    pub uuid: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub description: String,
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable book fields, already validated by the caller.
#[derive(Debug, Clone)]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub description: String,
    pub price_cents: i64,
    pub stock: i64,
}

const BOOK_COLUMNS: &str =
    "uuid, title, author, isbn, description, price_cents, stock, created_at, updated_at";

fn map_write_error(e: sqlx::Error) -> StoreError {
    if is_unique_violation(&e) {
        StoreError::DuplicateIsbn
    } else {
        e.into()
    }
}

impl BookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a book. A duplicate ISBN is reported by the UNIQUE constraint.
    pub async fn create(&self, uuid: &str, fields: &BookFields) -> Result<Book, StoreError> {
        sqlx::query(
            "INSERT INTO books (uuid, title, author, isbn, description, price_cents, stock) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(&fields.title)
        .bind(&fields.author)
        .bind(&fields.isbn)
        .bind(&fields.description)
        .bind(fields.price_cents)
        .bind(fields.stock)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        self.get_by_uuid(uuid)
            .await?
            .ok_or(StoreError::Unavailable(sqlx::Error::RowNotFound))
    }

    /// Get a book by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Book>, StoreError> {
        let book: Option<Book> =
            sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE uuid = ?"))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(book)
    }

    /// Search by title, author or ISBN substring. Returns the page and the total match count.
    pub async fn search(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Book>, i64), StoreError> {
        let pattern = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => format!("%{}%", escape_like(q)),
            None => "%".to_string(),
        };

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM books \
             WHERE title LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\' OR isbn LIKE ?1 ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let books: Vec<Book> = sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books \
             WHERE title LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\' OR isbn LIKE ?1 ESCAPE '\\' \
             ORDER BY title COLLATE NOCASE, id LIMIT ?2 OFFSET ?3"
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total))
    }

    /// Replace the editable fields of a book. Returns `None` if it does not exist.
    pub async fn update(&self, uuid: &str, fields: &BookFields) -> Result<Option<Book>, StoreError> {
        let result = sqlx::query(
            "UPDATE books SET title = ?, author = ?, isbn = ?, description = ?, price_cents = ?, \
             stock = ?, updated_at = datetime('now') WHERE uuid = ?",
        )
        .bind(&fields.title)
        .bind(&fields.author)
        .bind(&fields.isbn)
        .bind(&fields.description)
        .bind(fields.price_cents)
        .bind(fields.stock)
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_uuid(uuid).await
    }

    /// Delete a book by UUID.
    pub async fn delete(&self, uuid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
