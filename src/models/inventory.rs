//! Inventory item model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{Category, ItemCondition, ItemStatus, MaintenanceNeeds, ServiceKind};

/// Inventory item with its four impact counters.
///
/// The counters are only ever changed through a reconciliation transaction;
/// their sum never exceeds `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryItem {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub category: Category,
    /// Total owned units
    pub quantity: i32,
    pub borrowed_quantity: i32,
    pub maintenance_quantity: i32,
    pub calibration_quantity: i32,
    pub disposal_quantity: i32,
    pub status: ItemStatus,
    pub condition: ItemCondition,
    pub maintenance_needs: MaintenanceNeeds,
    /// Purchase cost of a single unit
    pub unit_cost: Option<Decimal>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: DateTime<Utc>,
}

impl InventoryItem {
    /// Current value of the counter matching a service hold
    pub fn service_quantity(&self, kind: ServiceKind) -> i32 {
        match kind {
            ServiceKind::Maintenance => self.maintenance_quantity,
            ServiceKind::Calibration => self.calibration_quantity,
        }
    }

    pub fn has_impacts(&self) -> bool {
        self.borrowed_quantity != 0
            || self.maintenance_quantity != 0
            || self.calibration_quantity != 0
            || self.disposal_quantity != 0
    }
}

/// Item as returned by the API, with its computed availability
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemDetails {
    #[serde(flatten)]
    pub item: InventoryItem,
    /// Units currently eligible for new borrowing
    pub available: i32,
    /// Whether a new borrow request would pass the eligibility gate
    pub borrowable: bool,
}

/// Intake of a new inventory item
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub category: Category,
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
    pub condition: Option<ItemCondition>,
    pub unit_cost: Option<Decimal>,
}

/// Attribute update; counters and quantity are not part of it
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateItem {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<ItemStatus>,
    pub condition: Option<ItemCondition>,
    pub maintenance_needs: Option<MaintenanceNeeds>,
    pub unit_cost: Option<Decimal>,
}

fn check_unit_cost(cost: Option<Decimal>) -> Result<(), String> {
    match cost {
        Some(cost) if cost.is_sign_negative() => Err("unit_cost must not be negative".to_string()),
        _ => Ok(()),
    }
}

impl CreateItem {
    pub fn check_amounts(&self) -> Result<(), String> {
        check_unit_cost(self.unit_cost)
    }
}

impl UpdateItem {
    pub fn check_amounts(&self) -> Result<(), String> {
        check_unit_cost(self.unit_cost)
    }

    pub fn apply_to(&self, item: &mut InventoryItem) {
        if let Some(ref name) = self.name {
            item.name = name.clone();
        }
        if let Some(ref description) = self.description {
            item.description = Some(description.clone());
        }
        if let Some(ref location) = self.location {
            item.location = Some(location.clone());
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(condition) = self.condition {
            item.condition = condition;
        }
        if let Some(needs) = self.maintenance_needs {
            item.maintenance_needs = needs;
        }
        if let Some(cost) = self.unit_cost {
            item.unit_cost = Some(cost);
        }
    }
}

/// New total quantity for an item
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustQuantity {
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
}

/// Units to put on (or take off) a maintenance or calibration hold
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ServiceHold {
    pub kind: ServiceKind,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}
