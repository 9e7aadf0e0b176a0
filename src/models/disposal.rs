//! Disposal record: permanent removal of consumable stock

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{text_enum, DisposalMethod};
use super::transition::TransitionError;

text_enum! {
    /// `Pending → {Completed, Cancelled}`, nothing else
    DisposalStatus {
        Pending => "Pending",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

impl DisposalStatus {
    pub fn complete(self) -> Result<Self, TransitionError> {
        match self {
            DisposalStatus::Pending => Ok(DisposalStatus::Completed),
            other => Err(TransitionError::new("disposal", other, "complete")),
        }
    }

    pub fn cancel(self) -> Result<Self, TransitionError> {
        match self {
            DisposalStatus::Pending => Ok(DisposalStatus::Cancelled),
            other => Err(TransitionError::new("disposal", other, "cancel")),
        }
    }

    pub fn is_terminal(self) -> bool {
        self != DisposalStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DisposalRecord {
    pub id: i32,
    pub item_id: i32,
    pub disposal_quantity: i32,
    pub disposal_method: DisposalMethod,
    pub reason: String,
    pub status: DisposalStatus,
    pub original_cost: Option<Decimal>,
    pub salvage_value: Option<Decimal>,
    pub requested_by: i32,
    pub requested_by_name: String,
    pub decided_by: Option<i32>,
    pub decided_by_name: Option<String>,
    pub decision_date: Option<DateTime<Utc>>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DisposalRequest {
    pub item_id: i32,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub method: DisposalMethod,
    #[validate(length(min = 1, max = 2000, message = "A reason of at most 2000 characters is required"))]
    pub reason: String,
    /// Defaults to the item's unit cost times the quantity
    pub original_cost: Option<Decimal>,
    pub salvage_value: Option<Decimal>,
}

impl DisposalRequest {
    pub fn check_amounts(&self) -> Result<(), String> {
        for (label, amount) in [("original_cost", self.original_cost), ("salvage_value", self.salvage_value)] {
            if amount.map(|a| a.is_sign_negative()).unwrap_or(false) {
                return Err(format!("{} must not be negative", label));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewDisposal {
    pub item_id: i32,
    pub disposal_quantity: i32,
    pub disposal_method: DisposalMethod,
    pub reason: String,
    pub original_cost: Option<Decimal>,
    pub salvage_value: Option<Decimal>,
    pub requested_by: i32,
    pub requested_by_name: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisposalDecision {
    Complete,
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_disposals_are_terminal() {
        assert_eq!(DisposalStatus::Pending.complete(), Ok(DisposalStatus::Completed));
        assert_eq!(DisposalStatus::Pending.cancel(), Ok(DisposalStatus::Cancelled));
        assert!(DisposalStatus::Completed.cancel().is_err());
        assert!(DisposalStatus::Cancelled.complete().is_err());
        assert!(DisposalStatus::Completed.is_terminal());
        assert!(!DisposalStatus::Pending.is_terminal());
    }
}
