//! Data models for Labtrack

pub mod borrowing;
pub mod disposal;
pub mod enums;
pub mod inventory;
pub mod otp;
pub mod returning;
pub mod transition;
pub mod user;

// Re-export commonly used types
pub use borrowing::{BorrowingRecord, BorrowingStatus};
pub use disposal::{DisposalRecord, DisposalStatus};
pub use enums::{BorrowerType, Category, DamageSeverity, ItemCondition, ItemStatus, MaintenanceNeeds};
pub use inventory::InventoryItem;
pub use otp::OtpChallenge;
pub use returning::{ReturningRecord, ReturningStatus};
pub use user::{Actor, Role};
