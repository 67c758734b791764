//! HTTP route handlers for the booklog server.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::ApiError;
use crate::book::{BookDraft, BookPatch, BookRecord};
use crate::core::report::StatusReport;
use crate::runtime::handle::LibraryHandle;
use crate::transaction::{BookTransaction, TransactionDraft};
use crate::types::{BookId, BookStatus};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub library: LibraryHandle,
}

/// Body of `POST /books/{id}/check-out`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckOutRequest {
    pub user_id: String,
    #[serde(deserialize_with = "crate::time::deserialize_due_date")]
    pub due_date: DateTime<Utc>,
}

/// Query string of `GET /books`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

impl ListParams {
    fn status(&self) -> Result<Option<BookStatus>, ApiError> {
        match self.status.as_deref() {
            None => Ok(None),
            Some(raw) => BookStatus::parse(raw).map(Some).ok_or_else(|| {
                ApiError::bad_request("status", format!("unknown status {raw:?}"))
            }),
        }
    }
}

/// Handle POST /books
pub async fn handle_create_book(
    State(state): State<AppState>,
    body: Result<Json<BookDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<BookRecord>), ApiError> {
    let Json(draft) = body?;
    let book = state.library.create_book(draft).await?;
    tracing::info!(book_id = book.id, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Handle GET /books
///
/// Accepts an optional `status` filter (`available` or `checked_out`).
pub async fn handle_list_books(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<BookRecord>>, ApiError> {
    let Query(params) = params?;
    let books = state.library.list_books(params.status()?).await?;
    Ok(Json(books))
}

/// Handle GET /books/{id}
pub async fn handle_get_book(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<Json<BookRecord>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.library.get_book(id).await?))
}

/// Handle PATCH /books/{id}
pub async fn handle_update_book(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
    body: Result<Json<BookPatch>, JsonRejection>,
) -> Result<Json<BookRecord>, ApiError> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.library.update_book(id, patch).await?))
}

/// Handle DELETE /books/{id}
pub async fn handle_delete_book(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.library.delete_book(id).await?;
    tracing::info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Handle POST /books/{id}/check-out
pub async fn handle_check_out(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
    body: Result<Json<CheckOutRequest>, JsonRejection>,
) -> Result<Json<BookRecord>, ApiError> {
    let Path(id) = id?;
    let Json(req) = body?;
    let book = state.library.check_out(id, req.user_id, req.due_date).await?;
    tracing::info!(book_id = id, due_date = %req.due_date, "book checked out");
    Ok(Json(book))
}

/// Handle POST /books/{id}/check-in
pub async fn handle_check_in(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<Json<BookRecord>, ApiError> {
    let Path(id) = id?;
    let book = state.library.check_in(id).await?;
    tracing::info!(book_id = id, "book checked in");
    Ok(Json(book))
}

/// Handle GET /books/status/report
pub async fn handle_status_report(
    State(state): State<AppState>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.library.status_report().await?))
}

/// Handle GET /books/{id}/transactions
///
/// Most recent first; an unknown id yields an empty list.
pub async fn handle_history(
    State(state): State<AppState>,
    id: Result<Path<BookId>, PathRejection>,
) -> Result<Json<Vec<BookTransaction>>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.library.history(id).await?))
}

/// Handle POST /books/transactions
pub async fn handle_record_transaction(
    State(state): State<AppState>,
    body: Result<Json<TransactionDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<BookTransaction>), ApiError> {
    let Json(draft) = body?;
    let txn = state.library.record_transaction(draft).await?;
    Ok((StatusCode::CREATED, Json(txn)))
}

/// Handle GET /-/healthy
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
