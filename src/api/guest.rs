//! Guest endpoints: email verification and borrow requests without an account

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        borrowing::{BorrowingRecord, GuestBorrowRequest},
        otp::{OtpPurpose, OtpSent, SendOtpRequest, VerificationResult, VerifyOtpRequest},
    },
    services::Committed,
    AppState,
};

/// Email a verification code
#[utoipa::path(
    post,
    path = "/guest/otp/send",
    tag = "guest",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code issued", body = OtpSent),
        (status = 400, description = "Invalid email", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> AppResult<Json<Committed<OtpSent>>> {
    request.validate()?;
    let purpose = request.purpose.unwrap_or(OtpPurpose::GuestRequest);
    let sent = state.services.otp.send(&request.email, purpose, None).await?;
    Ok(Json(sent))
}

/// Check a verification code
#[utoipa::path(
    post,
    path = "/guest/otp/verify",
    tag = "guest",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified", body = VerificationResult),
        (status = 401, description = "Code expired, wrong or exhausted", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> AppResult<Json<VerificationResult>> {
    request.validate()?;
    let result = state.services.otp.verify(&request.email, &request.code).await?;
    Ok(Json(result))
}

/// Submit a borrow request with a verified email
#[utoipa::path(
    post,
    path = "/guest/borrowings",
    tag = "guest",
    request_body = GuestBorrowRequest,
    responses(
        (status = 201, description = "Request recorded as pending", body = BorrowingRecord),
        (status = 401, description = "Email not verified", body = crate::error::ErrorResponse),
        (status = 409, description = "Not enough units or duplicate request", body = crate::error::ErrorResponse),
        (status = 422, description = "Item cannot be borrowed", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_guest_borrowing(
    State(state): State<AppState>,
    Json(request): Json<GuestBorrowRequest>,
) -> AppResult<(StatusCode, Json<Committed<BorrowingRecord>>)> {
    let record = state.services.borrowings.submit_guest(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
