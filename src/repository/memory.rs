//! In-process backend
//!
//! Serves the test suites and single-instance development setups
//! (`database.url = "memory://"`). Each item has its own async mutex; a
//! transaction holds it and stages record writes until commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{ChallengeStore, CirculationStore, ItemTransaction};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrower, NewBorrowing},
        disposal::NewDisposal,
        inventory::CreateItem,
        returning::NewReturning,
        BorrowingRecord, BorrowingStatus, DisposalRecord, DisposalStatus, InventoryItem, ItemCondition,
        ItemStatus, MaintenanceNeeds, OtpChallenge, ReturningRecord, ReturningStatus,
    },
};

#[derive(Debug, Default)]
struct Tables {
    last_id: i32,
    items: BTreeMap<i32, InventoryItem>,
    borrowings: BTreeMap<i32, BorrowingRecord>,
    returnings: BTreeMap<i32, ReturningRecord>,
    disposals: BTreeMap<i32, DisposalRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn item_lock(&self, item_id: i32) -> AppResult<Arc<AsyncMutex<()>>> {
        let mut locks = lock(&self.locks)?;
        Ok(locks.entry(item_id).or_default().clone())
    }
}

#[async_trait]
impl CirculationStore for MemoryRepository {
    async fn begin(&self, item_id: i32) -> AppResult<Box<dyn ItemTransaction>> {
        let guard = self.item_lock(item_id)?.lock_owned().await;
        let item = {
            let tables = lock(&self.tables)?;
            tables.items.get(&item_id).cloned()
        }
        .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", item_id)))?;

        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            _guard: guard,
            item,
            borrowings: BTreeMap::new(),
            returnings: BTreeMap::new(),
            disposals: BTreeMap::new(),
        }))
    }

    async fn insert_item(&self, data: &CreateItem, now: DateTime<Utc>) -> AppResult<InventoryItem> {
        let mut tables = lock(&self.tables)?;
        let item = InventoryItem {
            id: tables.next_id(),
            name: data.name.clone(),
            description: data.description.clone(),
            location: data.location.clone(),
            category: data.category,
            quantity: data.quantity,
            borrowed_quantity: 0,
            maintenance_quantity: 0,
            calibration_quantity: 0,
            disposal_quantity: 0,
            status: ItemStatus::Active,
            condition: data.condition.unwrap_or(ItemCondition::Good),
            maintenance_needs: MaintenanceNeeds::No,
            unit_cost: data.unit_cost,
            crea_date: now,
            modif_date: now,
        };
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: i32) -> AppResult<InventoryItem> {
        lock(&self.tables)?
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))
    }

    async fn list_items(&self) -> AppResult<Vec<InventoryItem>> {
        let tables = lock(&self.tables)?;
        let mut items: Vec<InventoryItem> = tables.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_borrowing(&self, id: i32) -> AppResult<BorrowingRecord> {
        lock(&self.tables)?
            .borrowings
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    async fn list_borrowings_for(&self, borrower_id: i32) -> AppResult<Vec<BorrowingRecord>> {
        let tables = lock(&self.tables)?;
        let mut records: Vec<BorrowingRecord> = tables
            .borrowings
            .values()
            .filter(|b| b.borrower_id == Some(borrower_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.requested_date.cmp(&a.requested_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn get_returning(&self, id: i32) -> AppResult<ReturningRecord> {
        lock(&self.tables)?
            .returnings
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Return with id {} not found", id)))
    }

    async fn get_disposal(&self, id: i32) -> AppResult<DisposalRecord> {
        lock(&self.tables)?
            .disposals
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Disposal with id {} not found", id)))
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let is_due = |b: &BorrowingRecord| b.status == BorrowingStatus::Released && now > b.intended_return_date;

        let item_ids: BTreeSet<i32> = {
            let tables = lock(&self.tables)?;
            tables.borrowings.values().filter(|b| is_due(b)).map(|b| b.item_id).collect()
        };

        let mut marked = 0;
        for item_id in item_ids {
            let _guard = self.item_lock(item_id)?.lock_owned().await;
            let mut tables = lock(&self.tables)?;
            for record in tables.borrowings.values_mut() {
                if record.item_id != item_id || !is_due(record) {
                    continue;
                }
                if let Ok(next) = record.status.mark_overdue() {
                    record.status = next;
                    record.modif_date = now;
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }

    async fn ping(&self) -> AppResult<()> {
        lock(&self.tables).map(|_| ())
    }
}

struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    _guard: OwnedMutexGuard<()>,
    item: InventoryItem,
    borrowings: BTreeMap<i32, BorrowingRecord>,
    returnings: BTreeMap<i32, ReturningRecord>,
    disposals: BTreeMap<i32, DisposalRecord>,
}

impl MemoryTransaction {
    /// Committed borrowings of this item overlaid with the staged ones
    fn merged_borrowings(&self) -> AppResult<Vec<BorrowingRecord>> {
        let tables = lock(&self.tables)?;
        let mut merged: BTreeMap<i32, BorrowingRecord> = tables
            .borrowings
            .values()
            .filter(|b| b.item_id == self.item.id)
            .map(|b| (b.id, b.clone()))
            .collect();
        merged.extend(self.borrowings.iter().map(|(id, b)| (*id, b.clone())));
        Ok(merged.into_values().collect())
    }

    fn merged_returnings(&self) -> AppResult<Vec<ReturningRecord>> {
        let tables = lock(&self.tables)?;
        let mut merged: BTreeMap<i32, ReturningRecord> = tables
            .returnings
            .values()
            .filter(|r| r.item_id == self.item.id)
            .map(|r| (r.id, r.clone()))
            .collect();
        merged.extend(self.returnings.iter().map(|(id, r)| (*id, r.clone())));
        Ok(merged.into_values().collect())
    }

    fn allocate_id(&self) -> AppResult<i32> {
        Ok(lock(&self.tables)?.next_id())
    }
}

#[async_trait]
impl ItemTransaction for MemoryTransaction {
    fn item(&self) -> &InventoryItem {
        &self.item
    }

    async fn borrowing(&mut self, id: i32) -> AppResult<BorrowingRecord> {
        self.merged_borrowings()?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    async fn pending_request_exists(&mut self, borrower: &Borrower) -> AppResult<bool> {
        Ok(self
            .merged_borrowings()?
            .iter()
            .any(|b| b.status == BorrowingStatus::Pending && borrower.matches(b)))
    }

    async fn has_open_records(&mut self) -> AppResult<bool> {
        if self.merged_borrowings()?.iter().any(|b| !b.status.is_terminal()) {
            return Ok(true);
        }
        let tables = lock(&self.tables)?;
        Ok(tables
            .disposals
            .values()
            .chain(self.disposals.values())
            .any(|d| d.item_id == self.item.id && d.status == DisposalStatus::Pending))
    }

    async fn insert_borrowing(&mut self, new: &NewBorrowing) -> AppResult<BorrowingRecord> {
        let record = BorrowingRecord {
            id: self.allocate_id()?,
            item_id: new.item_id,
            quantity: new.quantity,
            borrower_type: new.borrower.borrower_type,
            borrower_id: new.borrower.id,
            borrower_name: new.borrower.name.clone(),
            borrower_email: new.borrower.email.clone(),
            purpose: new.purpose.clone(),
            requested_date: new.requested_date,
            intended_borrow_date: new.intended_borrow_date,
            intended_return_date: new.intended_return_date,
            released_date: None,
            actual_return_date: None,
            status: BorrowingStatus::Pending,
            condition_on_borrow: None,
            condition_on_return: None,
            decided_by: None,
            decided_by_name: None,
            decision_reason: None,
            decision_date: None,
            modif_date: new.requested_date,
        };
        self.borrowings.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_borrowing(&mut self, record: &BorrowingRecord) -> AppResult<()> {
        self.borrowings.insert(record.id, record.clone());
        Ok(())
    }

    async fn returning(&mut self, id: i32) -> AppResult<ReturningRecord> {
        self.merged_returnings()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Return with id {} not found", id)))
    }

    async fn returning_for_borrowing(&mut self, borrowing_id: i32) -> AppResult<Option<ReturningRecord>> {
        Ok(self
            .merged_returnings()?
            .into_iter()
            .find(|r| r.borrowing_id == borrowing_id))
    }

    async fn insert_returning(&mut self, new: &NewReturning) -> AppResult<ReturningRecord> {
        if self.returning_for_borrowing(new.borrowing_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "A return already exists for borrowing {}",
                new.borrowing_id
            )));
        }
        let record = ReturningRecord {
            id: self.allocate_id()?,
            borrowing_id: new.borrowing_id,
            item_id: new.item_id,
            condition_before: new.condition_before,
            condition_after: new.condition_after,
            damage_severity: new.damage_severity,
            damage_description: new.damage_description.clone(),
            actual_return_date: new.actual_return_date,
            is_late: new.assessment.is_late,
            late_days: new.assessment.late_days,
            penalty_fee: new.assessment.penalty_fee,
            damage_fee: new.assessment.damage_fee,
            total_fee: new.assessment.total_fee,
            is_fee_paid: false,
            status: ReturningStatus::Pending,
            notes: new.notes.clone(),
            decided_by: None,
            decided_by_name: None,
            decision_date: None,
            crea_date: new.submitted_at,
            modif_date: new.submitted_at,
        };
        self.returnings.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_returning(&mut self, record: &ReturningRecord) -> AppResult<()> {
        self.returnings.insert(record.id, record.clone());
        Ok(())
    }

    async fn disposal(&mut self, id: i32) -> AppResult<DisposalRecord> {
        if let Some(record) = self.disposals.get(&id) {
            return Ok(record.clone());
        }
        lock(&self.tables)?
            .disposals
            .get(&id)
            .filter(|d| d.item_id == self.item.id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Disposal with id {} not found", id)))
    }

    async fn insert_disposal(&mut self, new: &NewDisposal) -> AppResult<DisposalRecord> {
        let record = DisposalRecord {
            id: self.allocate_id()?,
            item_id: new.item_id,
            disposal_quantity: new.disposal_quantity,
            disposal_method: new.disposal_method,
            reason: new.reason.clone(),
            status: DisposalStatus::Pending,
            original_cost: new.original_cost,
            salvage_value: new.salvage_value,
            requested_by: new.requested_by,
            requested_by_name: new.requested_by_name.clone(),
            decided_by: None,
            decided_by_name: None,
            decision_date: None,
            crea_date: new.submitted_at,
            modif_date: new.submitted_at,
        };
        self.disposals.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_disposal(&mut self, record: &DisposalRecord) -> AppResult<()> {
        self.disposals.insert(record.id, record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>, item: &InventoryItem) -> AppResult<()> {
        let this = *self;
        let mut tables = lock(&this.tables)?;
        if !tables.items.contains_key(&item.id) {
            return Err(AppError::NotFound(format!("Item with id {} not found", item.id)));
        }
        tables.items.insert(item.id, item.clone());
        tables.borrowings.extend(this.borrowings);
        tables.returnings.extend(this.returnings);
        tables.disposals.extend(this.disposals);
        Ok(())
    }

    async fn commit_removal(self: Box<Self>) -> AppResult<()> {
        let item_id = self.item.id;
        let mut tables = lock(&self.tables)?;
        tables.items.remove(&item_id);
        tables.borrowings.retain(|_, b| b.item_id != item_id);
        tables.returnings.retain(|_, r| r.item_id != item_id);
        tables.disposals.retain(|_, d| d.item_id != item_id);
        Ok(())
    }
}

/// OTP challenges held in process memory
#[derive(Clone, Default)]
pub struct MemoryChallengeStore {
    challenges: Arc<Mutex<HashMap<String, OtpChallenge>>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn load(&self, email: &str) -> AppResult<Option<OtpChallenge>> {
        Ok(lock(&self.challenges)?.get(email).cloned())
    }

    async fn replace(&self, challenge: &OtpChallenge) -> AppResult<()> {
        lock(&self.challenges)?.insert(challenge.email.clone(), challenge.clone());
        Ok(())
    }

    async fn compare_and_swap(&self, current: &OtpChallenge, next: Option<&OtpChallenge>) -> AppResult<bool> {
        let mut challenges = lock(&self.challenges)?;
        let unchanged = challenges
            .get(&current.email)
            .map(|stored| stored.id == current.id && stored.revision == current.revision)
            .unwrap_or(false);
        if !unchanged {
            return Ok(false);
        }
        match next {
            Some(next) => challenges.insert(current.email.clone(), next.clone()),
            None => challenges.remove(&current.email),
        };
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut challenges = lock(&self.challenges)?;
        let before = challenges.len();
        challenges.retain(|_, c| !c.is_expired(now));
        Ok((before - challenges.len()) as u64)
    }
}
