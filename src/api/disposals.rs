//! Disposal endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::disposal::{DisposalDecision, DisposalRecord, DisposalRequest},
    AppState,
};

use super::AuthenticatedUser;

#[derive(Deserialize, ToSchema)]
pub struct DisposalDecisionRequest {
    pub decision: DisposalDecision,
}

/// Submit a disposal; the units are reserved immediately
#[utoipa::path(
    post,
    path = "/disposals",
    tag = "disposals",
    security(("bearer_auth" = [])),
    request_body = DisposalRequest,
    responses(
        (status = 201, description = "Disposal pending", body = DisposalRecord),
        (status = 409, description = "More than available", body = crate::error::ErrorResponse),
        (status = 422, description = "Category cannot be disposed", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_disposal(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(request): Json<DisposalRequest>,
) -> AppResult<(StatusCode, Json<DisposalRecord>)> {
    let record = state.services.disposals.submit(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/disposals/{id}",
    tag = "disposals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Disposal ID")),
    responses(
        (status = 200, description = "Disposal", body = DisposalRecord),
        (status = 404, description = "Disposal not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_disposal(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<DisposalRecord>> {
    actor.require_staff()?;
    let record = state.services.disposals.get(id).await?;
    Ok(Json(record))
}

/// Complete or cancel a pending disposal
#[utoipa::path(
    post,
    path = "/disposals/{id}/decision",
    tag = "disposals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Disposal ID")),
    request_body = DisposalDecisionRequest,
    responses(
        (status = 200, description = "Disposal resolved", body = DisposalRecord),
        (status = 409, description = "Disposal already resolved", body = crate::error::ErrorResponse)
    )
)]
pub async fn decide_disposal(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<DisposalDecisionRequest>,
) -> AppResult<Json<DisposalRecord>> {
    let record = state.services.disposals.decide(&actor, id, request.decision).await?;
    Ok(Json(record))
}
