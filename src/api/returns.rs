//! Return endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::returning::{ReturnDecision, ReturnSubmission, ReturningRecord},
    services::Committed,
    AppState,
};

use super::AuthenticatedUser;

#[derive(Deserialize, ToSchema)]
pub struct ReturnDecisionRequest {
    pub decision: ReturnDecision,
}

/// Return borrowed units
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body = ReturnSubmission,
    responses(
        (status = 201, description = "Return recorded with its fees", body = ReturningRecord),
        (status = 400, description = "Damage without description", body = crate::error::ErrorResponse),
        (status = 409, description = "Return already exists or borrowing not out", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_return(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(borrowing_id): Path<i32>,
    Json(submission): Json<ReturnSubmission>,
) -> AppResult<(StatusCode, Json<Committed<ReturningRecord>>)> {
    let record = state.services.returns.submit(&actor, borrowing_id, submission).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Get one return
#[utoipa::path(
    get,
    path = "/returns/{id}",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return", body = ReturningRecord),
        (status = 404, description = "Return not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_return(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReturningRecord>> {
    let record = state.services.returns.get(&actor, id).await?;
    Ok(Json(record))
}

/// Approve or reject a pending return
#[utoipa::path(
    post,
    path = "/returns/{id}/decision",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Return ID")),
    request_body = ReturnDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = ReturningRecord),
        (status = 409, description = "Return not pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn decide_return(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ReturnDecisionRequest>,
) -> AppResult<Json<Committed<ReturningRecord>>> {
    let record = state.services.returns.decide(&actor, id, request.decision).await?;
    Ok(Json(record))
}

/// Record payment of the fees of an approved return
#[utoipa::path(
    post,
    path = "/returns/{id}/payment",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return completed", body = ReturningRecord),
        (status = 409, description = "Return not approved", body = crate::error::ErrorResponse)
    )
)]
pub async fn record_payment(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReturningRecord>> {
    let record = state.services.returns.record_fee_payment(&actor, id).await?;
    Ok(Json(record))
}
