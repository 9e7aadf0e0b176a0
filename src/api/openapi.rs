//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrowings, disposals, guest, health, items, returns};

/// Declares the `bearer_auth` scheme referenced by the protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Labtrack API",
        version = "1.0.0",
        description = "Laboratory inventory and circulation REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&BearerAuth),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Items
        items::list_items,
        items::get_item,
        items::create_item,
        items::update_item,
        items::delete_item,
        items::adjust_quantity,
        items::hold_for_service,
        items::release_from_service,
        // Borrowings
        borrowings::submit_borrowing,
        borrowings::list_borrowings,
        borrowings::get_borrowing,
        borrowings::decide_borrowing,
        borrowings::release_borrowing,
        borrowings::cancel_borrowing,
        // Returns
        returns::submit_return,
        returns::get_return,
        returns::decide_return,
        returns::record_payment,
        // Disposals
        disposals::submit_disposal,
        disposals::get_disposal,
        disposals::decide_disposal,
        // Guest
        guest::send_otp,
        guest::verify_otp,
        guest::submit_guest_borrowing,
    ),
    components(
        schemas(
            // Items
            crate::models::inventory::InventoryItem,
            crate::models::inventory::ItemDetails,
            crate::models::inventory::CreateItem,
            crate::models::inventory::UpdateItem,
            crate::models::inventory::AdjustQuantity,
            crate::models::inventory::ServiceHold,
            crate::models::enums::Category,
            crate::models::enums::ItemStatus,
            crate::models::enums::ItemCondition,
            crate::models::enums::MaintenanceNeeds,
            crate::models::enums::ServiceKind,
            // Borrowings
            crate::models::borrowing::BorrowingRecord,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowRequest,
            crate::models::borrowing::BorrowDecision,
            crate::models::enums::BorrowerType,
            borrowings::BorrowDecisionRequest,
            // Returns
            crate::models::returning::ReturningRecord,
            crate::models::returning::ReturningStatus,
            crate::models::returning::ReturnSubmission,
            crate::models::returning::ReturnDecision,
            crate::models::enums::DamageSeverity,
            returns::ReturnDecisionRequest,
            // Disposals
            crate::models::disposal::DisposalRecord,
            crate::models::disposal::DisposalStatus,
            crate::models::disposal::DisposalRequest,
            crate::models::disposal::DisposalDecision,
            crate::models::enums::DisposalMethod,
            disposals::DisposalDecisionRequest,
            // Guest
            crate::models::borrowing::GuestBorrowRequest,
            crate::models::otp::OtpPurpose,
            crate::models::otp::SendOtpRequest,
            crate::models::otp::VerifyOtpRequest,
            crate::models::otp::OtpSent,
            crate::models::otp::VerificationResult,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "items", description = "Inventory items and counters"),
        (name = "borrowings", description = "Borrow requests and releases"),
        (name = "returns", description = "Returns and fees"),
        (name = "disposals", description = "Disposal of consumable stock"),
        (name = "guest", description = "Email-verified guest requests")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
