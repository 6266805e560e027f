//! Book catalog API endpoints.
//!
//! Reads are public. Writes require the admin role.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::{AdminOnly, Auth};
use crate::cli::IpExtractor;
use crate::db::{Book, BookFields, Database};
use crate::impl_has_auth_backend;
use crate::session::SessionManager;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const MAX_TITLE_LEN: usize = 200;
const MAX_AUTHOR_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_QUERY_LEN: usize = 200;

#[derive(Clone)]
pub struct BooksState {
    pub db: Database,
    pub sessions: SessionManager,
    pub ip_extractor: Option<IpExtractor>,
}

impl_has_auth_backend!(BooksState);

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{uuid}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookRequest {
    title: String,
    author: String,
    isbn: String,
    #[serde(default)]
    description: String,
    price_cents: i64,
    #[serde(default)]
    stock: i64,
}

#[derive(Serialize)]
struct BookResponse {
    success: bool,
    data: Book,
}

#[derive(Serialize)]
struct BookListResponse {
    success: bool,
    data: Vec<Book>,
    page: i64,
    limit: i64,
    total: i64,
}

/// Strip hyphens and spaces. The rest must be 10 or 13 digits.
fn normalize_isbn(isbn: &str) -> Result<String, ApiError> {
    let digits: String = isbn.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !matches!(digits.len(), 10 | 13) {
        return Err(ApiError::bad_request(
            "ISBN must contain 10 or 13 digits (hyphens and spaces allowed)",
        ));
    }
    Ok(digits)
}

fn required_text(value: &str, field: &str, max_len: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{} cannot be longer than {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

impl BookRequest {
    fn into_fields(self) -> Result<BookFields, ApiError> {
        let title = required_text(&self.title, "Title", MAX_TITLE_LEN)?;
        let author = required_text(&self.author, "Author", MAX_AUTHOR_LEN)?;
        let isbn = normalize_isbn(&self.isbn)?;

        let description = self.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ApiError::bad_request("Description is too long"));
        }
        if self.price_cents < 0 {
            return Err(ApiError::bad_request("Price cannot be negative"));
        }
        if self.stock < 0 {
            return Err(ApiError::bad_request("Stock cannot be negative"));
        }

        Ok(BookFields {
            title,
            author,
            isbn,
            description,
            price_cents: self.price_cents,
            stock: self.stock,
        })
    }
}

/// Clamp paging parameters. Pages are 1-based.
fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);
    (page, limit, offset)
}

async fn list_books(
    State(state): State<BooksState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.as_deref().is_some_and(|q| q.len() > MAX_QUERY_LEN) {
        return Err(ApiError::bad_request("Search query is too long"));
    }

    let (page, limit, offset) = page_window(query.page, query.limit);
    let (books, total) = state
        .db
        .books()
        .search(query.q.as_deref(), limit, offset)
        .await
        .db_err("Failed to search books")?;

    Ok(Json(BookListResponse {
        success: true,
        data: books,
        page,
        limit,
        total,
    }))
}

async fn get_book(
    State(state): State<BooksState>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let book = state
        .db
        .books()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get book")?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    Ok(Json(BookResponse {
        success: true,
        data: book,
    }))
}

async fn create_book(
    State(state): State<BooksState>,
    _admin: Auth<AdminOnly>,
    Json(payload): Json<BookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = payload.into_fields()?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let book = state
        .db
        .books()
        .create(&uuid, &fields)
        .await
        .db_err("Failed to create book")?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            success: true,
            data: book,
        }),
    ))
}

async fn update_book(
    State(state): State<BooksState>,
    _admin: Auth<AdminOnly>,
    Path(uuid): Path<String>,
    Json(payload): Json<BookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    let fields = payload.into_fields()?;

    let book = state
        .db
        .books()
        .update(&uuid, &fields)
        .await
        .db_err("Failed to update book")?
        .ok_or_else(|| ApiError::not_found("Book not found"))?;

    Ok(Json(BookResponse {
        success: true,
        data: book,
    }))
}

async fn delete_book(
    State(state): State<BooksState>,
    _admin: Auth<AdminOnly>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let deleted = state
        .db
        .books()
        .delete(&uuid)
        .await
        .db_err("Failed to delete book")?;

    if !deleted {
        return Err(ApiError::not_found("Book not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
