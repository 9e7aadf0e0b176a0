//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::borrowing::{BorrowDecision, BorrowRequest, BorrowingRecord},
    services::Committed,
    AppState,
};

use super::AuthenticatedUser;

/// Decision on a pending borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowDecisionRequest {
    pub decision: BorrowDecision,
    /// Stored with the decision
    pub reason: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct BorrowingsQuery {
    /// Defaults to the caller; other borrowers need the admin role
    pub borrower_id: Option<i32>,
}

/// Submit a borrow request
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Request recorded as pending", body = BorrowingRecord),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 409, description = "Not enough units or duplicate request", body = crate::error::ErrorResponse),
        (status = 422, description = "Item cannot be borrowed", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<Committed<BorrowingRecord>>)> {
    let record = state.services.borrowings.submit(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List borrowings, newest first
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingsQuery),
    responses(
        (status = 200, description = "Borrowings with overdue applied", body = Vec<BorrowingRecord>)
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<BorrowingsQuery>,
) -> AppResult<Json<Vec<BorrowingRecord>>> {
    let borrower_id = query.borrower_id.unwrap_or(actor.id);
    let records = state.services.borrowings.list_for(&actor, borrower_id).await?;
    Ok(Json(records))
}

/// Get one borrowing
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing", body = BorrowingRecord),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingRecord>> {
    let record = state.services.borrowings.get(&actor, id).await?;
    Ok(Json(record))
}

/// Approve or reject a pending request
#[utoipa::path(
    post,
    path = "/borrowings/{id}/decision",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body = BorrowDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = BorrowingRecord),
        (status = 409, description = "Not pending or not enough units", body = crate::error::ErrorResponse)
    )
)]
pub async fn decide_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<BorrowDecisionRequest>,
) -> AppResult<Json<Committed<BorrowingRecord>>> {
    let record = state
        .services
        .borrowings
        .decide(&actor, id, request.decision, request.reason)
        .await?;
    Ok(Json(record))
}

/// Release approved units to the borrower
#[utoipa::path(
    post,
    path = "/borrowings/{id}/release",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Units released", body = BorrowingRecord),
        (status = 409, description = "Not approved or not enough units", body = crate::error::ErrorResponse)
    )
)]
pub async fn release_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Committed<BorrowingRecord>>> {
    let record = state.services.borrowings.release(&actor, id).await?;
    Ok(Json(record))
}

/// Cancel an approved borrowing
#[utoipa::path(
    post,
    path = "/borrowings/{id}/cancel",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing cancelled", body = BorrowingRecord),
        (status = 409, description = "Not approved", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingRecord>> {
    let record = state.services.borrowings.cancel(&actor, id).await?;
    Ok(Json(record))
}
