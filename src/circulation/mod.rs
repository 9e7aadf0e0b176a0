//! Pure circulation core
//!
//! Availability math, eligibility gates, return fees and counter
//! reconciliation. Nothing here performs I/O; the services run these
//! functions inside a per-item transaction.

pub mod availability;
pub mod clock;
pub mod eligibility;
pub mod fees;
pub mod reconciliation;

pub use availability::available;
pub use clock::{Clock, FixedClock, SystemClock};
pub use eligibility::{can_borrow, can_dispose, Ineligible};
pub use reconciliation::{CounterChange, Impact};
