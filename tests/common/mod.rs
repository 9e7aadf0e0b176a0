//! Shared fixtures for the in-process service tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use labtrack_server::{
    circulation::{availability::check_invariant, available, Clock, FixedClock},
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        borrowing::{BorrowDecision, BorrowRequest},
        inventory::{CreateItem, ItemDetails},
        returning::ReturnSubmission,
        Actor, BorrowingRecord, Category, DamageSeverity, ItemCondition, Role,
    },
    repository::{ChallengeStore, CirculationStore, MemoryChallengeStore, MemoryRepository},
    services::{
        notifier::{Notifier, TemplateKind},
        Services,
    },
};

/// Keeps every notification; can be switched to fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, TemplateKind, Value)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, TemplateKind, Value)> {
        self.sent.lock().unwrap().clone()
    }

    /// Code of the last OTP mail sent to `email`
    pub fn last_code(&self, email: &str) -> String {
        self.sent()
            .into_iter()
            .rev()
            .find(|(to, kind, _)| to == email && *kind == TemplateKind::OtpCode)
            .and_then(|(_, _, payload)| payload["code"].as_str().map(str::to_string))
            .expect("no code was sent")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, template: TemplateKind, payload: &Value) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Notifier("smtp unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), template, payload.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub services: Services,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub admin: Actor,
    pub student: Actor,
    pub other_student: Actor,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

pub fn actor(id: i32, role: Role, name: &str) -> Actor {
    Actor {
        id,
        role,
        name: name.to_string(),
        email: format!("{}@lab.example.edu", name.to_lowercase()),
    }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryRepository::new()), Arc::new(MemoryChallengeStore::new()))
}

/// Services over the given backends, with a recording notifier and a fixed clock
pub fn harness_with(store: Arc<dyn CirculationStore>, challenges: Arc<dyn ChallengeStore>) -> Harness {
    let clock = Arc::new(FixedClock::new(start()));
    let notifier = Arc::new(RecordingNotifier::default());
    let config = AppConfig::default();
    let services = Services::new(store, challenges, notifier.clone(), clock.clone(), &config);
    Harness {
        services,
        clock,
        notifier,
        admin: actor(1, Role::Admin, "Ada"),
        student: actor(2, Role::Student, "Sam"),
        other_student: actor(3, Role::Student, "Kim"),
    }
}

impl Harness {
    pub async fn create_item(&self, category: Category, quantity: i32) -> ItemDetails {
        self.services
            .inventory
            .create(
                &self.admin,
                CreateItem {
                    name: format!("{} stock", category),
                    description: None,
                    location: Some("Lab 2".to_string()),
                    category,
                    quantity,
                    condition: None,
                    unit_cost: None,
                },
            )
            .await
            .unwrap()
    }

    /// Borrow for three days starting in one hour
    pub fn request(&self, item_id: i32, quantity: i32) -> BorrowRequest {
        let now = self.clock.now();
        BorrowRequest {
            item_id,
            quantity,
            intended_borrow_date: now + Duration::hours(1),
            intended_return_date: now + Duration::days(3),
            purpose: Some("Titration practical".to_string()),
        }
    }

    /// Submit, approve and release a borrowing for `borrower`
    pub async fn released(&self, borrower: &Actor, item_id: i32, quantity: i32) -> BorrowingRecord {
        let borrowings = &self.services.borrowings;
        let pending = borrowings
            .submit(borrower, self.request(item_id, quantity))
            .await
            .unwrap()
            .record;
        borrowings
            .decide(&self.admin, pending.id, BorrowDecision::Approve, None)
            .await
            .unwrap();
        borrowings.release(&self.admin, pending.id).await.unwrap().record
    }

    /// Current item, after checking its counters are consistent
    pub async fn item(&self, id: i32) -> ItemDetails {
        let details = self.services.inventory.get(id).await.unwrap();
        check_invariant(&details.item).unwrap();
        assert_eq!(details.available, available(&details.item));
        details
    }
}

pub fn clean_return() -> ReturnSubmission {
    ReturnSubmission {
        condition_after: ItemCondition::Good,
        damage_severity: DamageSeverity::None,
        damage_description: None,
        actual_return_date: None,
        notes: None,
    }
}
