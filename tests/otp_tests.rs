//! Email verification and guest borrow requests

mod common;

use chrono::Duration;
use serde_json::json;

use common::{harness, Harness};
use labtrack_server::{
    error::AppError,
    models::{
        borrowing::GuestBorrowRequest,
        otp::OtpPurpose,
        BorrowerType, BorrowingStatus, Category,
    },
};

const GUEST: &str = "guest@example.org";

fn verification_message(err: AppError) -> String {
    match err {
        AppError::Verification(message) => message,
        other => panic!("expected a verification failure, got {:?}", other),
    }
}

fn guest_request(h: &Harness, item_id: i32) -> GuestBorrowRequest {
    GuestBorrowRequest {
        email: GUEST.to_string(),
        name: "Visiting Researcher".to_string(),
        request: h.request(item_id, 1),
    }
}

async fn send(h: &Harness) -> String {
    h.services
        .otp
        .send(GUEST, OtpPurpose::GuestRequest, None)
        .await
        .unwrap();
    h.notifier.last_code(GUEST)
}

#[tokio::test]
async fn test_code_is_accepted_just_before_expiry() {
    let h = harness();
    let sent = h
        .services
        .otp
        .send(GUEST, OtpPurpose::GuestRequest, None)
        .await
        .unwrap();
    assert_eq!(sent.record.expires_at, common::start() + Duration::minutes(5));
    let code = h.notifier.last_code(GUEST);
    assert_eq!(code.len(), 6);

    h.clock.advance(Duration::minutes(4) + Duration::seconds(59));
    let result = h.services.otp.verify(GUEST, &code).await.unwrap();
    assert!(result.verified);
}

#[tokio::test]
async fn test_expired_code_is_rejected_and_removed() {
    let h = harness();
    let code = send(&h).await;

    h.clock.advance(Duration::minutes(5) + Duration::seconds(1));
    let message = verification_message(h.services.otp.verify(GUEST, &code).await.unwrap_err());
    assert!(message.contains("expired"), "{}", message);

    let message = verification_message(h.services.otp.verify(GUEST, &code).await.unwrap_err());
    assert!(message.contains("No verification code"), "{}", message);
}

#[tokio::test]
async fn test_attempts_are_limited() {
    let h = harness();
    let code = send(&h).await;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for remaining in (0..5).rev() {
        let message = verification_message(h.services.otp.verify(GUEST, wrong).await.unwrap_err());
        assert!(message.contains(&format!("{} attempts left", remaining)), "{}", message);
    }

    let message = verification_message(h.services.otp.verify(GUEST, &code).await.unwrap_err());
    assert!(message.contains("Too many attempts"), "{}", message);
    let message = verification_message(h.services.otp.verify(GUEST, &code).await.unwrap_err());
    assert!(message.contains("No verification code"), "{}", message);
}

#[tokio::test]
async fn test_email_is_normalized() {
    let h = harness();
    let code = send(&h).await;

    let result = h.services.otp.verify("  Guest@Example.ORG ", &code).await.unwrap();
    assert_eq!(result.email, GUEST);
}

#[tokio::test]
async fn test_new_code_replaces_the_previous_one() {
    let h = harness();
    let first = send(&h).await;
    let second = send(&h).await;

    if first != second {
        let err = h.services.otp.verify(GUEST, &first).await.unwrap_err();
        assert!(matches!(err, AppError::Verification(_)));
    }
    h.services.otp.verify(GUEST, &second).await.unwrap();
}

#[tokio::test]
async fn test_guest_request_uses_up_the_verification() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 3).await.item.id;
    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();

    let record = h
        .services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap()
        .record;
    assert_eq!(record.status, BorrowingStatus::Pending);
    assert_eq!(record.borrower_type, BorrowerType::Guest);
    assert_eq!(record.borrower_id, None);
    assert_eq!(record.borrower_email, GUEST);

    let message = verification_message(
        h.services
            .borrowings
            .submit_guest(guest_request(&h, id))
            .await
            .unwrap_err(),
    );
    assert!(message.contains("No verification code"), "{}", message);
}

#[tokio::test]
async fn test_guest_request_needs_a_verified_email() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 3).await.item.id;
    let code = send(&h).await;

    let message = verification_message(
        h.services
            .borrowings
            .submit_guest(guest_request(&h, id))
            .await
            .unwrap_err(),
    );
    assert!(message.contains("not been verified"), "{}", message);

    // the challenge survives and can still be verified and used
    h.services.otp.verify(GUEST, &code).await.unwrap();
    h.services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_verified_code_expires_before_use() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 3).await.item.id;
    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();

    h.clock.advance(Duration::minutes(6));
    let message = verification_message(
        h.services
            .borrowings
            .submit_guest(guest_request(&h, id))
            .await
            .unwrap_err(),
    );
    assert!(message.contains("expired"), "{}", message);
}

#[tokio::test]
async fn test_ineligible_item_keeps_the_verification() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 1).await.item.id;
    h.released(&h.student, id, 1).await;
    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();

    let err = h
        .services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Eligibility(_)), "got {:?}", err);

    let other = h.create_item(Category::Equipment, 1).await.item.id;
    h.services
        .borrowings
        .submit_guest(guest_request(&h, other))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_refused_guest_request_keeps_the_verification() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 3).await.item.id;
    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();

    let mut too_many = guest_request(&h, id);
    too_many.request.quantity = 5;
    let err = h.services.borrowings.submit_guest(too_many).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    let record = h
        .services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap()
        .record;
    assert_eq!(record.quantity, 1);
    assert_eq!(h.item(id).await.available, 3);
}

#[tokio::test]
async fn test_duplicate_guest_request_keeps_the_verification() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 3).await.item.id;
    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();
    h.services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap();

    let code = send(&h).await;
    h.services.otp.verify(GUEST, &code).await.unwrap();
    let err = h
        .services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    let other = h.create_item(Category::Equipment, 1).await.item.id;
    h.services
        .borrowings
        .submit_guest(guest_request(&h, other))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_registration_code_cannot_be_used_for_a_guest_request() {
    let h = harness();
    let id = h.create_item(Category::Equipment, 1).await.item.id;
    h.services
        .otp
        .send(GUEST, OtpPurpose::Registration, None)
        .await
        .unwrap();
    let code = h.notifier.last_code(GUEST);
    h.services.otp.verify(GUEST, &code).await.unwrap();

    let err = h
        .services
        .borrowings
        .submit_guest(guest_request(&h, id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Verification(_)));
}

#[tokio::test]
async fn test_registration_code_is_redeemed_with_its_payload() {
    let h = harness();
    let otp = &h.services.otp;
    otp.send(GUEST, OtpPurpose::Registration, Some(json!({"name": "Visiting Researcher"})))
        .await
        .unwrap();
    let code = h.notifier.last_code(GUEST);
    otp.verify(GUEST, &code).await.unwrap();

    h.clock.advance(Duration::minutes(9));
    let challenge = otp.verified_challenge(GUEST, OtpPurpose::Registration).await.unwrap();
    assert_eq!(challenge.payload, Some(json!({"name": "Visiting Researcher"})));
    otp.redeem(&challenge).await.unwrap();

    let message = verification_message(otp.redeem(&challenge).await.unwrap_err());
    assert!(message.contains("No verification code"), "{}", message);
}

#[tokio::test]
async fn test_sweep_purges_expired_challenges() {
    let h = harness();
    send(&h).await;
    h.services
        .otp
        .send("other@example.org", OtpPurpose::Registration, None)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(6));
    let report = h.services.sweep.run_once().await.unwrap();
    assert_eq!(report.challenges_purged, 1);

    h.clock.advance(Duration::minutes(5));
    let report = h.services.sweep.run_once().await.unwrap();
    assert_eq!(report.challenges_purged, 1);
}
