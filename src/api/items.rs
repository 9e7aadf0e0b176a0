//! Inventory item endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::inventory::{AdjustQuantity, CreateItem, ItemDetails, ServiceHold, UpdateItem},
    AppState,
};

use super::AuthenticatedUser;

/// List inventory items with their availability
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All items", body = Vec<ItemDetails>)
    )
)]
pub async fn list_items(
    State(state): State<AppState>,
    AuthenticatedUser(_actor): AuthenticatedUser,
) -> AppResult<Json<Vec<ItemDetails>>> {
    let items = state.services.inventory.list().await?;
    Ok(Json(items))
}

/// Get one item
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item details", body = ItemDetails),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    AuthenticatedUser(_actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.inventory.get(id).await?;
    Ok(Json(item))
}

/// Register a new item; all counters start at zero
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item created", body = ItemDetails),
        (status = 400, description = "Invalid item", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_item(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(data): Json<CreateItem>,
) -> AppResult<(StatusCode, Json<ItemDetails>)> {
    let item = state.services.inventory.create(&actor, data).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Update descriptive attributes of an item
#[utoipa::path(
    put,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    request_body = UpdateItem,
    responses(
        (status = 200, description = "Item updated", body = ItemDetails),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<UpdateItem>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.inventory.update(&actor, id, data).await?;
    Ok(Json(item))
}

/// Delete an item that has nothing outstanding
#[utoipa::path(
    delete,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 409, description = "Units out or records open", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.inventory.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the total owned quantity
#[utoipa::path(
    put,
    path = "/items/{id}/quantity",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    request_body = AdjustQuantity,
    responses(
        (status = 200, description = "Quantity adjusted", body = ItemDetails),
        (status = 409, description = "Below committed units", body = crate::error::ErrorResponse)
    )
)]
pub async fn adjust_quantity(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<AdjustQuantity>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.inventory.adjust_quantity(&actor, id, data).await?;
    Ok(Json(item))
}

/// Hold units for maintenance or calibration
#[utoipa::path(
    post,
    path = "/items/{id}/holds",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    request_body = ServiceHold,
    responses(
        (status = 200, description = "Units held", body = ItemDetails),
        (status = 409, description = "Not enough units available", body = crate::error::ErrorResponse)
    )
)]
pub async fn hold_for_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(hold): Json<ServiceHold>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.inventory.hold_for_service(&actor, id, hold).await?;
    Ok(Json(item))
}

/// Bring held units back into stock
#[utoipa::path(
    post,
    path = "/items/{id}/holds/release",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Item ID")),
    request_body = ServiceHold,
    responses(
        (status = 200, description = "Units released", body = ItemDetails),
        (status = 409, description = "More than currently held", body = crate::error::ErrorResponse)
    )
)]
pub async fn release_from_service(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(hold): Json<ServiceHold>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.inventory.release_from_service(&actor, id, hold).await?;
    Ok(Json(item))
}
