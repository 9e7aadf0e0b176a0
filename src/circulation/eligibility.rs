//! Eligibility gates for borrowing and disposal

use thiserror::Error;

use super::availability::available;
use crate::{
    error::{AppError, AppResult},
    models::{Category, InventoryItem, ItemCondition, ItemStatus, MaintenanceNeeds},
};

/// Why an item cannot currently be borrowed or disposed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("item {0} is inactive")]
    Inactive(i32),
    #[error("item {0} is '{1}'")]
    Condition(i32, ItemCondition),
    #[error("item {0} has maintenance needs '{1}'")]
    MaintenanceNeeded(i32, MaintenanceNeeds),
    #[error("item {0} has no units available")]
    NothingAvailable(i32),
    #[error("item {0} is {1}; only consumables and liquids can be disposed")]
    NotDisposable(i32, Category),
}

impl From<Ineligible> for AppError {
    fn from(reason: Ineligible) -> Self {
        AppError::Eligibility(reason.to_string())
    }
}

/// Whether a new borrow request may be accepted for `item`
pub fn can_borrow(item: &InventoryItem) -> Result<(), Ineligible> {
    if item.status != ItemStatus::Active {
        return Err(Ineligible::Inactive(item.id));
    }
    if matches!(item.condition, ItemCondition::UnderMaintenance | ItemCondition::OutOfStock) {
        return Err(Ineligible::Condition(item.id, item.condition));
    }
    if item.maintenance_needs != MaintenanceNeeds::No {
        return Err(Ineligible::MaintenanceNeeded(item.id, item.maintenance_needs));
    }
    if available(item) <= 0 {
        return Err(Ineligible::NothingAvailable(item.id));
    }
    Ok(())
}

/// Whether `quantity` units of `item` may be reserved for disposal.
///
/// Wrong category is an eligibility failure, a bad quantity a validation
/// failure, and a quantity above the available stock a conflict.
pub fn can_dispose(item: &InventoryItem, quantity: i32) -> AppResult<()> {
    if !item.category.is_disposable() {
        return Err(Ineligible::NotDisposable(item.id, item.category).into());
    }
    if quantity < 1 {
        return Err(AppError::Validation("Disposal quantity must be at least 1".to_string()));
    }
    let available = available(item);
    if quantity > available {
        return Err(AppError::Conflict(format!(
            "Cannot dispose {} units of item {}: only {} available",
            quantity, item.id, available
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::testing::item;

    #[test]
    fn test_active_good_item_with_stock_is_borrowable() {
        assert_eq!(can_borrow(&item(Category::Equipment, 1)), Ok(()));
    }

    #[test]
    fn test_borrow_gate_reasons() {
        let mut it = item(Category::Equipment, 3);
        it.status = ItemStatus::Inactive;
        assert_eq!(can_borrow(&it), Err(Ineligible::Inactive(1)));

        let mut it = item(Category::Equipment, 3);
        it.condition = ItemCondition::UnderMaintenance;
        assert!(matches!(can_borrow(&it), Err(Ineligible::Condition(_, _))));

        let mut it = item(Category::Equipment, 3);
        it.condition = ItemCondition::OutOfStock;
        assert!(matches!(can_borrow(&it), Err(Ineligible::Condition(_, _))));

        let mut it = item(Category::Equipment, 3);
        it.maintenance_needs = MaintenanceNeeds::Scheduled;
        assert!(matches!(can_borrow(&it), Err(Ineligible::MaintenanceNeeded(_, _))));

        let mut it = item(Category::Equipment, 3);
        it.borrowed_quantity = 3;
        assert_eq!(can_borrow(&it), Err(Ineligible::NothingAvailable(1)));
    }

    #[test]
    fn test_needs_repair_is_still_borrowable() {
        let mut it = item(Category::Equipment, 3);
        it.condition = ItemCondition::NeedsRepair;
        assert_eq!(can_borrow(&it), Ok(()));
    }

    #[test]
    fn test_dispose_gate() {
        let it = item(Category::Equipment, 5);
        assert!(matches!(can_dispose(&it, 1), Err(AppError::Eligibility(_))));

        let mut it = item(Category::Consumable, 5);
        it.borrowed_quantity = 2;
        assert!(can_dispose(&it, 3).is_ok());
        assert!(matches!(can_dispose(&it, 4), Err(AppError::Conflict(_))));
        assert!(matches!(can_dispose(&it, 0), Err(AppError::Validation(_))));
    }
}
