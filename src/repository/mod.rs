//! Repository layer
//!
//! Inventory counters are the shared mutable resource of the service. Every
//! change to an item's counters or to a record referencing the item runs in
//! an [`ItemTransaction`], which holds the item's lock from `begin` until it
//! is committed or dropped. Dropping a transaction discards its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        borrowing::{Borrower, NewBorrowing},
        disposal::NewDisposal,
        inventory::CreateItem,
        returning::NewReturning,
        BorrowingRecord, DisposalRecord, InventoryItem, OtpChallenge, ReturningRecord,
    },
};

pub use memory::{MemoryChallengeStore, MemoryRepository};
pub use postgres::PgRepository;

/// Circulation persistence
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// Lock `item_id` and open a unit of work on it
    async fn begin(&self, item_id: i32) -> AppResult<Box<dyn ItemTransaction>>;

    async fn insert_item(&self, data: &CreateItem, now: DateTime<Utc>) -> AppResult<InventoryItem>;
    async fn get_item(&self, id: i32) -> AppResult<InventoryItem>;
    async fn list_items(&self) -> AppResult<Vec<InventoryItem>>;

    async fn get_borrowing(&self, id: i32) -> AppResult<BorrowingRecord>;
    async fn list_borrowings_for(&self, borrower_id: i32) -> AppResult<Vec<BorrowingRecord>>;
    async fn get_returning(&self, id: i32) -> AppResult<ReturningRecord>;
    async fn get_disposal(&self, id: i32) -> AppResult<DisposalRecord>;

    /// Persist `overdue` on released borrowings due before `now`; returns the count
    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> AppResult<()>;
}

/// Unit of work on one locked inventory item
#[async_trait]
pub trait ItemTransaction: Send {
    /// Item row as read under the lock
    fn item(&self) -> &InventoryItem;

    async fn borrowing(&mut self, id: i32) -> AppResult<BorrowingRecord>;
    /// A `pending` request by `borrower` for this item exists
    async fn pending_request_exists(&mut self, borrower: &Borrower) -> AppResult<bool>;
    /// Non-terminal borrowings or pending disposals reference this item
    async fn has_open_records(&mut self) -> AppResult<bool>;
    async fn insert_borrowing(&mut self, new: &NewBorrowing) -> AppResult<BorrowingRecord>;
    async fn update_borrowing(&mut self, record: &BorrowingRecord) -> AppResult<()>;

    async fn returning(&mut self, id: i32) -> AppResult<ReturningRecord>;
    async fn returning_for_borrowing(&mut self, borrowing_id: i32) -> AppResult<Option<ReturningRecord>>;
    async fn insert_returning(&mut self, new: &NewReturning) -> AppResult<ReturningRecord>;
    async fn update_returning(&mut self, record: &ReturningRecord) -> AppResult<()>;

    async fn disposal(&mut self, id: i32) -> AppResult<DisposalRecord>;
    async fn insert_disposal(&mut self, new: &NewDisposal) -> AppResult<DisposalRecord>;
    async fn update_disposal(&mut self, record: &DisposalRecord) -> AppResult<()>;

    /// Write `item` and every staged record change atomically
    async fn commit(self: Box<Self>, item: &InventoryItem) -> AppResult<()>;
    /// Delete the item (and its record history) atomically
    async fn commit_removal(self: Box<Self>) -> AppResult<()>;
}

/// Keyed store of OTP challenges, one per email.
///
/// Updates are compare-and-swap on the challenge `id` and `revision` so
/// concurrent verifications of the same email never both apply.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn load(&self, email: &str) -> AppResult<Option<OtpChallenge>>;
    /// Store `challenge`, replacing any live challenge for its email
    async fn replace(&self, challenge: &OtpChallenge) -> AppResult<()>;
    /// Swap `current` for `next` (delete when `None`) if `current` is still stored
    async fn compare_and_swap(&self, current: &OtpChallenge, next: Option<&OtpChallenge>) -> AppResult<bool>;
    /// Delete challenges expired at `now`; returns the count
    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
