//! Available quantity of an item

use crate::models::InventoryItem;

/// Units held by the four impact counters
pub fn committed(item: &InventoryItem) -> i64 {
    i64::from(item.borrowed_quantity)
        + i64::from(item.maintenance_quantity)
        + i64::from(item.calibration_quantity)
        + i64::from(item.disposal_quantity)
}

/// Units eligible for new borrowing.
///
/// Clamped at zero so an inconsistent row never reports negative stock.
pub fn available(item: &InventoryItem) -> i32 {
    let remaining = i64::from(item.quantity) - committed(item);
    remaining.clamp(0, i64::from(i32::MAX)) as i32
}

/// Counter bounds that must hold for every committed item row
pub fn check_invariant(item: &InventoryItem) -> Result<(), String> {
    let counters = [
        ("borrowed_quantity", item.borrowed_quantity),
        ("maintenance_quantity", item.maintenance_quantity),
        ("calibration_quantity", item.calibration_quantity),
        ("disposal_quantity", item.disposal_quantity),
    ];
    if item.quantity < 0 {
        return Err(format!("item {} has a negative quantity", item.id));
    }
    for (name, value) in counters {
        if value < 0 {
            return Err(format!("item {} has a negative {}", item.id, name));
        }
    }
    if committed(item) > i64::from(item.quantity) {
        return Err(format!(
            "item {} commits {} units but owns {}",
            item.id,
            committed(item),
            item.quantity
        ));
    }
    Ok(())
}
