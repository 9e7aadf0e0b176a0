//! Returning record: one per borrowing once a return is initiated

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{text_enum, DamageSeverity, ItemCondition};
use super::transition::TransitionError;

text_enum! {
    ReturningStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
    }
}

impl ReturningStatus {
    fn refuse(self, action: &'static str) -> TransitionError {
        TransitionError::new("return", self, action)
    }

    pub fn approve(self) -> Result<Self, TransitionError> {
        match self {
            ReturningStatus::Pending => Ok(ReturningStatus::Approved),
            other => Err(other.refuse("approve")),
        }
    }

    pub fn reject(self) -> Result<Self, TransitionError> {
        match self {
            ReturningStatus::Pending => Ok(ReturningStatus::Rejected),
            other => Err(other.refuse("reject")),
        }
    }

    /// Fees settled; the record becomes history.
    pub fn complete(self) -> Result<Self, TransitionError> {
        match self {
            ReturningStatus::Approved => Ok(ReturningStatus::Completed),
            other => Err(other.refuse("complete")),
        }
    }

    /// A rejected return may be submitted again for the same borrowing.
    pub fn reopen(self) -> Result<Self, TransitionError> {
        match self {
            ReturningStatus::Rejected => Ok(ReturningStatus::Pending),
            other => Err(other.refuse("reopen")),
        }
    }
}

/// Fees and lateness computed for a return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReturnAssessment {
    pub late_days: i32,
    pub is_late: bool,
    pub penalty_fee: Decimal,
    pub damage_fee: Decimal,
    pub total_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReturningRecord {
    pub id: i32,
    pub borrowing_id: i32,
    pub item_id: i32,
    pub condition_before: Option<ItemCondition>,
    pub condition_after: ItemCondition,
    pub damage_severity: DamageSeverity,
    pub damage_description: Option<String>,
    pub actual_return_date: DateTime<Utc>,
    pub is_late: bool,
    pub late_days: i32,
    pub penalty_fee: Decimal,
    pub damage_fee: Decimal,
    pub total_fee: Decimal,
    pub is_fee_paid: bool,
    pub status: ReturningStatus,
    pub notes: Option<String>,
    pub decided_by: Option<i32>,
    pub decided_by_name: Option<String>,
    pub decision_date: Option<DateTime<Utc>>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: DateTime<Utc>,
}

impl ReturningRecord {
    /// Overwrite the submission fields when a rejected return is submitted again
    pub fn resubmit(&mut self, new: &NewReturning) -> Result<(), TransitionError> {
        self.status = self.status.reopen()?;
        self.condition_before = new.condition_before;
        self.condition_after = new.condition_after;
        self.damage_severity = new.damage_severity;
        self.damage_description = new.damage_description.clone();
        self.actual_return_date = new.actual_return_date;
        self.is_late = new.assessment.is_late;
        self.late_days = new.assessment.late_days;
        self.penalty_fee = new.assessment.penalty_fee;
        self.damage_fee = new.assessment.damage_fee;
        self.total_fee = new.assessment.total_fee;
        self.is_fee_paid = false;
        self.notes = new.notes.clone();
        self.decided_by = None;
        self.decided_by_name = None;
        self.decision_date = None;
        self.modif_date = new.submitted_at;
        Ok(())
    }
}

/// Return as declared by the borrower
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReturnSubmission {
    pub condition_after: ItemCondition,
    pub damage_severity: DamageSeverity,
    #[validate(length(max = 2000, message = "Damage description is limited to 2000 characters"))]
    pub damage_description: Option<String>,
    /// Defaults to the time of submission
    pub actual_return_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ReturnSubmission {
    /// Any damage must be described.
    pub fn check_damage(&self) -> Result<(), String> {
        let described = self
            .damage_description
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false);
        if self.damage_severity != DamageSeverity::None && !described {
            return Err(format!(
                "A damage description is required for {} damage",
                self.damage_severity
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewReturning {
    pub borrowing_id: i32,
    pub item_id: i32,
    pub condition_before: Option<ItemCondition>,
    pub condition_after: ItemCondition,
    pub damage_severity: DamageSeverity,
    pub damage_description: Option<String>,
    pub actual_return_date: DateTime<Utc>,
    pub assessment: ReturnAssessment,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReturnDecision {
    Approve,
    Reject,
}
