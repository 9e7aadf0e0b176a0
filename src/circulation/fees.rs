//! Lateness and damage fees for a return

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{config::FeesConfig, models::returning::ReturnAssessment, models::DamageSeverity};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days late, rounding any started day up.
pub fn late_days(intended_return_date: DateTime<Utc>, actual_return_date: DateTime<Utc>) -> i32 {
    let late_ms = (actual_return_date - intended_return_date).num_milliseconds();
    if late_ms <= 0 {
        return 0;
    }
    let days = (late_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    days.min(i64::from(i32::MAX)) as i32
}

/// Fees owed for a return. Depends only on its arguments.
pub fn assess(
    fees: &FeesConfig,
    intended_return_date: DateTime<Utc>,
    actual_return_date: DateTime<Utc>,
    severity: DamageSeverity,
) -> ReturnAssessment {
    let late_days = late_days(intended_return_date, actual_return_date);
    let penalty_fee = fees.late_rate_per_day * Decimal::from(late_days);
    let damage_fee = fees.damage.fee_for(severity);
    ReturnAssessment {
        late_days,
        is_late: late_days > 0,
        penalty_fee,
        damage_fee,
        total_fee: penalty_fee + damage_fee,
    }
}
