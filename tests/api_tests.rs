//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};

use labtrack_server::models::{user::UserClaims, Role};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Bearer token signed with the server's secret
fn token(id: i32, role: Role) -> String {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-this-secret-in-production".to_string());
    let now = chrono::Utc::now().timestamp();
    UserClaims {
        sub: id,
        role,
        name: format!("{} {}", role, id),
        email: format!("user{}@lab.example.edu", id),
        exp: now + 3600,
        iat: now,
    }
    .create_token(&secret)
    .expect("Failed to sign token")
}

async fn create_item(client: &Client, admin: &str, category: &str, quantity: i32) -> Value {
    let response = client
        .post(format!("{}/items", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({
            "name": "Burette 50 ml",
            "category": category,
            "quantity": quantity
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse response")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_items_require_authentication() {
    let client = Client::new();

    let response = client
        .get(format!("{}/items", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_student_cannot_create_items() {
    let client = Client::new();

    let response = client
        .post(format!("{}/items", BASE_URL))
        .bearer_auth(token(20, Role::Student))
        .json(&json!({ "name": "Pipette", "category": "Consumable", "quantity": 10 }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_release() {
    let client = Client::new();
    let admin = token(1, Role::Admin);
    let student = token(21, Role::Student);

    let item = create_item(&client, &admin, "Equipment", 2).await;
    assert_eq!(item["available"], 2);
    let item_id = item["id"].as_i64().expect("No item id");

    let now = chrono::Utc::now();
    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .bearer_auth(&student)
        .json(&json!({
            "item_id": item_id,
            "quantity": 1,
            "intended_borrow_date": now + chrono::Duration::hours(1),
            "intended_return_date": now + chrono::Duration::days(2)
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let borrowing: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(borrowing["status"], "pending");
    let borrowing_id = borrowing["id"].as_i64().expect("No borrowing id");

    let response = client
        .post(format!("{}/borrowings/{}/decision", BASE_URL, borrowing_id))
        .bearer_auth(&admin)
        .json(&json!({ "decision": "approve" }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/borrowings/{}/release", BASE_URL, borrowing_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    let item: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(item["borrowed_quantity"], 1);
    assert_eq!(item["available"], 1);
}

#[tokio::test]
#[ignore]
async fn test_equipment_disposal_is_unprocessable() {
    let client = Client::new();
    let admin = token(1, Role::Admin);
    let item = create_item(&client, &admin, "Equipment", 2).await;

    let response = client
        .post(format!("{}/disposals", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({
            "item_id": item["id"],
            "quantity": 1,
            "method": "Recycle",
            "reason": "Obsolete"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);
}

#[tokio::test]
#[ignore]
async fn test_guest_otp_send() {
    let client = Client::new();

    let response = client
        .post(format!("{}/guest/otp/send", BASE_URL))
        .json(&json!({ "email": "visitor@example.org" }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email"], "visitor@example.org");
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_guest_otp_wrong_code() {
    let client = Client::new();

    let response = client
        .post(format!("{}/guest/otp/verify", BASE_URL))
        .json(&json!({ "email": "nobody@example.org", "code": "123456" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}
