//! Borrowing record and its lifecycle
//!
//! ```text
//! pending ──► approved ──► released ──► return_requested ──► return_approved ──► returned
//!    │           │            │  ▲              │
//!    ▼           ▼            ▼  └── resume ── return_rejected
//! rejected   cancelled     overdue (time-derived label of released)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{text_enum, BorrowerType, ItemCondition};
use super::transition::TransitionError;
use super::user::Actor;

text_enum! {
    BorrowingStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Released => "released",
        Overdue => "overdue",
        ReturnRequested => "return_requested",
        ReturnApproved => "return_approved",
        ReturnRejected => "return_rejected",
        Returned => "returned",
        Cancelled => "cancelled",
    }
}

impl BorrowingStatus {
    fn refuse(self, action: &'static str) -> TransitionError {
        TransitionError::new("borrowing", self, action)
    }

    pub fn approve(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Pending => Ok(BorrowingStatus::Approved),
            other => Err(other.refuse("approve")),
        }
    }

    pub fn reject(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Pending => Ok(BorrowingStatus::Rejected),
            other => Err(other.refuse("reject")),
        }
    }

    pub fn release(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Approved => Ok(BorrowingStatus::Released),
            other => Err(other.refuse("release")),
        }
    }

    pub fn cancel(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Approved => Ok(BorrowingStatus::Cancelled),
            other => Err(other.refuse("cancel")),
        }
    }

    pub fn mark_overdue(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Released => Ok(BorrowingStatus::Overdue),
            other => Err(other.refuse("mark overdue")),
        }
    }

    /// Overdue borrowings are still out and can be returned.
    pub fn request_return(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::Released | BorrowingStatus::Overdue => Ok(BorrowingStatus::ReturnRequested),
            other => Err(other.refuse("request the return of")),
        }
    }

    pub fn approve_return(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::ReturnRequested => Ok(BorrowingStatus::ReturnApproved),
            other => Err(other.refuse("approve the return of")),
        }
    }

    pub fn reject_return(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::ReturnRequested => Ok(BorrowingStatus::ReturnRejected),
            other => Err(other.refuse("reject the return of")),
        }
    }

    pub fn complete_return(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::ReturnApproved => Ok(BorrowingStatus::Returned),
            other => Err(other.refuse("complete the return of")),
        }
    }

    /// A rejected return puts the borrowing back into circulation.
    pub fn resume(self) -> Result<Self, TransitionError> {
        match self {
            BorrowingStatus::ReturnRejected => Ok(BorrowingStatus::Released),
            other => Err(other.refuse("resume")),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BorrowingStatus::Rejected | BorrowingStatus::Cancelled | BorrowingStatus::Returned
        )
    }

    /// Whether the borrowed units are counted in `borrowed_quantity`
    pub fn holds_stock(self) -> bool {
        matches!(
            self,
            BorrowingStatus::Released
                | BorrowingStatus::Overdue
                | BorrowingStatus::ReturnRequested
                | BorrowingStatus::ReturnApproved
                | BorrowingStatus::ReturnRejected
        )
    }

    /// Status as seen at `now`: released past its return date reads as overdue.
    pub fn label_at(self, intended_return_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        match self {
            BorrowingStatus::Released if now > intended_return_date => BorrowingStatus::Overdue,
            other => other,
        }
    }
}

/// Borrowing record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingRecord {
    pub id: i32,
    pub item_id: i32,
    pub quantity: i32,
    pub borrower_type: BorrowerType,
    /// None for guest borrowers
    pub borrower_id: Option<i32>,
    pub borrower_name: String,
    pub borrower_email: String,
    pub purpose: Option<String>,
    pub requested_date: DateTime<Utc>,
    pub intended_borrow_date: DateTime<Utc>,
    pub intended_return_date: DateTime<Utc>,
    pub released_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub condition_on_borrow: Option<ItemCondition>,
    pub condition_on_return: Option<ItemCondition>,
    pub decided_by: Option<i32>,
    pub decided_by_name: Option<String>,
    pub decision_reason: Option<String>,
    pub decision_date: Option<DateTime<Utc>>,
    pub modif_date: DateTime<Utc>,
}

impl BorrowingRecord {
    /// Copy of the record with the time-derived overdue label applied
    pub fn labelled(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.status.label_at(self.intended_return_date, now);
        self
    }

    pub fn is_borrowed_by(&self, actor: &Actor) -> bool {
        self.borrower_id == Some(actor.id)
    }

    pub fn record_decision(&mut self, actor: &Actor, reason: Option<String>, now: DateTime<Utc>) {
        self.decided_by = Some(actor.id);
        self.decided_by_name = Some(actor.name.clone());
        self.decision_reason = reason;
        self.decision_date = Some(now);
        self.modif_date = now;
    }
}

/// Who is asking for the units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrower {
    pub borrower_type: BorrowerType,
    pub id: Option<i32>,
    pub name: String,
    pub email: String,
}

impl Borrower {
    pub fn from_actor(actor: &Actor) -> Self {
        Self {
            borrower_type: actor.borrower_type(),
            id: Some(actor.id),
            name: actor.name.clone(),
            email: actor.email.clone(),
        }
    }

    pub fn guest(name: &str, email: &str) -> Self {
        Self {
            borrower_type: BorrowerType::Guest,
            id: None,
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
        }
    }

    /// Registered borrowers match by id, guests by email.
    pub fn matches(&self, record: &BorrowingRecord) -> bool {
        match self.id {
            Some(id) => record.borrower_id == Some(id),
            None => record.borrower_id.is_none() && record.borrower_email == self.email,
        }
    }
}

/// Borrow request as submitted by an authenticated borrower
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    pub item_id: i32,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub intended_borrow_date: DateTime<Utc>,
    pub intended_return_date: DateTime<Utc>,
    #[validate(length(max = 1000, message = "Purpose is limited to 1000 characters"))]
    pub purpose: Option<String>,
}

impl BorrowRequest {
    pub fn check_dates(&self) -> Result<(), String> {
        if self.intended_return_date <= self.intended_borrow_date {
            return Err("Intended return date must be after the intended borrow date".to_string());
        }
        Ok(())
    }
}

/// Borrow request submitted by a guest after email verification
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct GuestBorrowRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    #[validate(nested)]
    #[serde(flatten)]
    pub request: BorrowRequest,
}

/// Row to insert when a request is accepted
#[derive(Debug, Clone)]
pub struct NewBorrowing {
    pub item_id: i32,
    pub quantity: i32,
    pub borrower: Borrower,
    pub purpose: Option<String>,
    pub requested_date: DateTime<Utc>,
    pub intended_borrow_date: DateTime<Utc>,
    pub intended_return_date: DateTime<Utc>,
}

/// Administrative decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowDecision {
    Approve,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_happy_path() {
        let status = BorrowingStatus::Pending
            .approve()
            .and_then(BorrowingStatus::release)
            .and_then(BorrowingStatus::request_return)
            .and_then(BorrowingStatus::approve_return)
            .and_then(BorrowingStatus::complete_return)
            .unwrap();
        assert_eq!(status, BorrowingStatus::Returned);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_rejected_return_resumes_circulation() {
        let status = BorrowingStatus::ReturnRequested
            .reject_return()
            .and_then(BorrowingStatus::resume)
            .unwrap();
        assert_eq!(status, BorrowingStatus::Released);
    }

    #[test]
    fn test_terminal_states_refuse_everything() {
        for status in [BorrowingStatus::Rejected, BorrowingStatus::Cancelled, BorrowingStatus::Returned] {
            assert!(status.approve().is_err());
            assert!(status.release().is_err());
            assert!(status.cancel().is_err());
            assert!(status.request_return().is_err());
            assert!(status.approve_return().is_err());
        }
    }

    #[test]
    fn test_pending_cannot_be_released_or_cancelled() {
        let err = BorrowingStatus::Pending.release().unwrap_err();
        assert_eq!(err.from, "pending");
        assert_eq!(err.to_string(), "cannot release a borrowing that is 'pending'");
        assert!(BorrowingStatus::Pending.cancel().is_err());
    }

    #[test]
    fn test_overdue_can_be_returned() {
        assert_eq!(
            BorrowingStatus::Overdue.request_return(),
            Ok(BorrowingStatus::ReturnRequested)
        );
    }

    #[test]
    fn test_overdue_label_is_time_derived() {
        let due = Utc::now();
        let released = BorrowingStatus::Released;
        assert_eq!(released.label_at(due, due), BorrowingStatus::Released);
        assert_eq!(released.label_at(due, due + Duration::seconds(1)), BorrowingStatus::Overdue);
        assert_eq!(
            BorrowingStatus::ReturnRequested.label_at(due, due + Duration::days(3)),
            BorrowingStatus::ReturnRequested
        );
    }

    #[test]
    fn test_guest_borrower_matches_by_email() {
        let guest = Borrower::guest(" Grace ", "Grace@Example.org ");
        assert_eq!(guest.email, "grace@example.org");
        assert_eq!(guest.name, "Grace");
    }
}
