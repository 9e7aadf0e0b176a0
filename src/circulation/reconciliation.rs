//! Impact counter arithmetic
//!
//! The only place counters are changed. Each change is validated against
//! the item as read under the item lock and yields the row to write back.

use chrono::{DateTime, Utc};

use super::availability::{available, check_invariant, committed};
use crate::{
    error::{AppError, AppResult},
    models::{enums::ServiceKind, InventoryItem},
};

/// The four impact counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    Borrowed,
    Maintenance,
    Calibration,
    Disposal,
}

impl Impact {
    fn counter_mut(self, item: &mut InventoryItem) -> &mut i32 {
        match self {
            Impact::Borrowed => &mut item.borrowed_quantity,
            Impact::Maintenance => &mut item.maintenance_quantity,
            Impact::Calibration => &mut item.calibration_quantity,
            Impact::Disposal => &mut item.disposal_quantity,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Impact::Borrowed => "borrowed",
            Impact::Maintenance => "maintenance",
            Impact::Calibration => "calibration",
            Impact::Disposal => "disposal",
        }
    }
}

impl From<ServiceKind> for Impact {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Maintenance => Impact::Maintenance,
            ServiceKind::Calibration => Impact::Calibration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    /// Take available units into an impact counter
    Reserve(Impact, i32),
    /// Give units held by an impact counter back
    Release(Impact, i32),
    /// Change the total owned quantity
    SetQuantity(i32),
    /// No counter moves; the transition only touches records
    Unchanged,
}

/// Apply `change` to `item`, returning the row to commit.
pub fn apply(item: &InventoryItem, change: CounterChange, now: DateTime<Utc>) -> AppResult<InventoryItem> {
    let mut next = item.clone();
    match change {
        CounterChange::Reserve(impact, quantity) => {
            require_positive(quantity)?;
            let available = available(item);
            if quantity > available {
                return Err(AppError::Conflict(format!(
                    "Cannot reserve {} units of item {} for {}: only {} available",
                    quantity,
                    item.id,
                    impact.label(),
                    available
                )));
            }
            *impact.counter_mut(&mut next) += quantity;
        }
        CounterChange::Release(impact, quantity) => {
            require_positive(quantity)?;
            let counter = impact.counter_mut(&mut next);
            if quantity > *counter {
                return Err(AppError::Conflict(format!(
                    "Cannot release {} {} units of item {}: only {} held",
                    quantity,
                    impact.label(),
                    item.id,
                    *counter
                )));
            }
            *counter -= quantity;
        }
        CounterChange::SetQuantity(quantity) => {
            if quantity < 0 {
                return Err(AppError::Validation("Quantity must not be negative".to_string()));
            }
            let committed = committed(item);
            if i64::from(quantity) < committed {
                return Err(AppError::Conflict(format!(
                    "Item {} has {} units committed; quantity cannot drop to {}",
                    item.id, committed, quantity
                )));
            }
            next.quantity = quantity;
        }
        CounterChange::Unchanged => return Ok(next),
    }
    check_invariant(&next).map_err(AppError::Internal)?;
    next.modif_date = now;
    Ok(next)
}

fn require_positive(quantity: i32) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::Validation("Quantity must be at least 1".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::testing::item;
    use crate::models::Category;

    #[test]
    fn test_reserve_and_release_borrowed() {
        let now = Utc::now();
        let it = item(Category::Equipment, 5);
        let reserved = apply(&it, CounterChange::Reserve(Impact::Borrowed, 2), now).unwrap();
        assert_eq!(reserved.borrowed_quantity, 2);
        assert_eq!(available(&reserved), 3);
        let released = apply(&reserved, CounterChange::Release(Impact::Borrowed, 2), now).unwrap();
        assert_eq!(released.borrowed_quantity, 0);
        assert_eq!(available(&released), 5);
    }

    #[test]
    fn test_reserve_beyond_available_conflicts() {
        let mut it = item(Category::Consumable, 4);
        it.maintenance_quantity = 3;
        let err = apply(&it, CounterChange::Reserve(Impact::Disposal, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_release_more_than_held_conflicts() {
        let mut it = item(Category::Equipment, 4);
        it.calibration_quantity = 1;
        let err = apply(&it, CounterChange::Release(Impact::Calibration, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_zero_quantity_is_invalid() {
        let it = item(Category::Equipment, 4);
        let err = apply(&it, CounterChange::Reserve(Impact::Borrowed, 0), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_quantity_cannot_drop_below_commitments() {
        let mut it = item(Category::Equipment, 6);
        it.borrowed_quantity = 2;
        it.disposal_quantity = 1;
        assert!(matches!(
            apply(&it, CounterChange::SetQuantity(2), Utc::now()),
            Err(AppError::Conflict(_))
        ));
        let shrunk = apply(&it, CounterChange::SetQuantity(3), Utc::now()).unwrap();
        assert_eq!(shrunk.quantity, 3);
        assert_eq!(available(&shrunk), 0);
    }

    #[test]
    fn test_unchanged_keeps_row() {
        let it = item(Category::Equipment, 6);
        assert_eq!(apply(&it, CounterChange::Unchanged, Utc::now()).unwrap(), it);
    }
}
