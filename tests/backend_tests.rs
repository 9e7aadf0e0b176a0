//! Postgres and Redis backends against live servers
//!
//! Run with: DATABASE_URL=... REDIS_URL=... cargo test --test backend_tests -- --ignored

mod common;

use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

use common::{clean_return, harness_with, Harness};
use labtrack_server::{
    circulation::Clock,
    error::AppError,
    models::{
        borrowing::{BorrowDecision, GuestBorrowRequest},
        otp::OtpPurpose,
        returning::{NewReturning, ReturnAssessment},
        Category, DamageSeverity, ItemCondition, OtpChallenge,
    },
    repository::{ChallengeStore, CirculationStore, MemoryChallengeStore, MemoryRepository, PgRepository},
    services::redis::RedisChallengeStore,
};
use rust_decimal::Decimal;

async fn postgres() -> Arc<PgRepository> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(PgRepository::new(pool))
}

async fn redis() -> Arc<RedisChallengeStore> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Arc::new(RedisChallengeStore::new(&url).await.expect("Failed to connect to Redis"))
}

fn unique_email() -> String {
    format!("guest-{}@example.org", Uuid::new_v4().simple())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn test_postgres_releases_are_serialized_per_item() {
    let h = harness_with(postgres().await, Arc::new(MemoryChallengeStore::new()));
    let id = h.create_item(Category::Equipment, 1).await.item.id;

    let mut approved = Vec::new();
    for borrower in [&h.student, &h.other_student] {
        let pending = h
            .services
            .borrowings
            .submit(borrower, h.request(id, 1))
            .await
            .unwrap()
            .record;
        h.services
            .borrowings
            .decide(&h.admin, pending.id, BorrowDecision::Approve, None)
            .await
            .unwrap();
        approved.push(pending.id);
    }

    let handles: Vec<_> = approved
        .into_iter()
        .map(|borrowing_id| {
            let borrowings = h.services.borrowings.clone();
            let admin = h.admin.clone();
            tokio::spawn(async move { borrowings.release(&admin, borrowing_id).await })
        })
        .collect();

    let mut released = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => released += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((released, conflicts), (1, 1));

    let details = h.item(id).await;
    assert_eq!(details.item.borrowed_quantity, 1);
    assert_eq!(details.available, 0);
}

#[tokio::test]
#[ignore]
async fn test_postgres_second_return_row_is_a_conflict() {
    let store = postgres().await;
    let h = harness_with(store.clone(), Arc::new(MemoryChallengeStore::new()));
    let id = h.create_item(Category::Equipment, 2).await.item.id;
    let borrowing = h.released(&h.student, id, 1).await;

    let first = h
        .services
        .returns
        .submit(&h.student, borrowing.id, clean_return())
        .await
        .unwrap()
        .record;

    let mut tx = store.begin(id).await.unwrap();
    let err = tx
        .insert_returning(&NewReturning {
            borrowing_id: borrowing.id,
            item_id: id,
            condition_before: None,
            condition_after: ItemCondition::Good,
            damage_severity: DamageSeverity::None,
            damage_description: None,
            actual_return_date: h.clock.now(),
            assessment: ReturnAssessment {
                late_days: 0,
                is_late: false,
                penalty_fee: Decimal::ZERO,
                damage_fee: Decimal::ZERO,
                total_fee: Decimal::ZERO,
            },
            notes: None,
            submitted_at: h.clock.now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);
    drop(tx);

    let stored = h.services.returns.get(&h.student, first.id).await.unwrap();
    assert_eq!(stored.id, first.id);
}

#[tokio::test]
#[ignore]
async fn test_redis_stale_challenge_loses_the_swap() {
    let store = redis().await;
    let email = unique_email();
    let now = chrono::Utc::now();
    let issued = OtpChallenge::issue(&email, "123456", OtpPurpose::GuestRequest, None, now, Duration::minutes(5));
    store.replace(&issued).await.unwrap();

    let mut verified = issued.clone();
    verified.revision += 1;
    verified.verified = true;
    assert!(store.compare_and_swap(&issued, Some(&verified)).await.unwrap());

    // the copy read before the first swap is stale now
    assert!(!store.compare_and_swap(&issued, None).await.unwrap());
    assert_eq!(store.load(&email).await.unwrap(), Some(verified.clone()));

    let resent = OtpChallenge::issue(&email, "654321", OtpPurpose::GuestRequest, None, now, Duration::minutes(5));
    store.replace(&resent).await.unwrap();
    assert!(!store.compare_and_swap(&verified, None).await.unwrap());

    assert!(store.compare_and_swap(&resent, None).await.unwrap());
    assert_eq!(store.load(&email).await.unwrap(), None);
}

#[tokio::test]
#[ignore]
async fn test_redis_purges_only_expired_challenges() {
    let store = redis().await;
    let now = chrono::Utc::now();
    let stale_email = unique_email();
    let live_email = unique_email();
    let stale = OtpChallenge::issue(
        &stale_email,
        "123456",
        OtpPurpose::GuestRequest,
        None,
        now - Duration::minutes(10),
        Duration::minutes(5),
    );
    let live = OtpChallenge::issue(&live_email, "123456", OtpPurpose::GuestRequest, None, now, Duration::minutes(5));
    store.replace(&stale).await.unwrap();
    store.replace(&live).await.unwrap();

    assert!(store.purge_expired(now).await.unwrap() >= 1);
    assert_eq!(store.load(&stale_email).await.unwrap(), None);
    assert_eq!(store.load(&live_email).await.unwrap(), Some(live.clone()));
    store.compare_and_swap(&live, None).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_guest_flow() {
    let h: Harness = harness_with(Arc::new(MemoryRepository::new()), redis().await);
    let id = h.create_item(Category::Equipment, 2).await.item.id;
    let email = unique_email();

    h.services
        .otp
        .send(&email, OtpPurpose::GuestRequest, None)
        .await
        .unwrap();
    let code = h.notifier.last_code(&email);
    h.services.otp.verify(&email, &code).await.unwrap();

    let request = || GuestBorrowRequest {
        email: email.clone(),
        name: "Visiting Researcher".to_string(),
        request: h.request(id, 1),
    };
    h.services.borrowings.submit_guest(request()).await.unwrap();
    let err = h.services.borrowings.submit_guest(request()).await.unwrap_err();
    assert!(matches!(err, AppError::Verification(_)), "got {:?}", err);
}
