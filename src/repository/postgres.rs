//! PostgreSQL backend
//!
//! `begin` opens a database transaction and takes `SELECT ... FOR UPDATE`
//! on the item row. Every record read inside the transaction locks its row
//! as well, so two transactions on the same item run one after the other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::{CirculationStore, ItemTransaction};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrower, NewBorrowing},
        disposal::NewDisposal,
        inventory::CreateItem,
        returning::NewReturning,
        BorrowingRecord, BorrowingStatus, DisposalRecord, DisposalStatus, InventoryItem, ItemCondition,
        ItemStatus, MaintenanceNeeds, ReturningRecord, ReturningStatus,
    },
};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<Postgres>,
}

impl PgRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CirculationStore for PgRepository {
    async fn begin(&self, item_id: i32) -> AppResult<Box<dyn ItemTransaction>> {
        let mut tx = self.pool.begin().await?;
        let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", item_id)))?;
        Ok(Box::new(PgItemTransaction { tx, item }))
    }

    async fn insert_item(&self, data: &CreateItem, now: DateTime<Utc>) -> AppResult<InventoryItem> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            INSERT INTO inventory_items (
                name, description, location, category, quantity,
                borrowed_quantity, maintenance_quantity, calibration_quantity, disposal_quantity,
                status, condition, maintenance_needs, unit_cost, crea_date, modif_date
            )
            VALUES ($1, $2, $3, $4, $5, 0, 0, 0, 0, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.location)
        .bind(data.category)
        .bind(data.quantity)
        .bind(ItemStatus::Active)
        .bind(data.condition.unwrap_or(ItemCondition::Good))
        .bind(MaintenanceNeeds::No)
        .bind(data.unit_cost)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    async fn get_item(&self, id: i32) -> AppResult<InventoryItem> {
        sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))
    }

    async fn list_items(&self) -> AppResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn get_borrowing(&self, id: i32) -> AppResult<BorrowingRecord> {
        sqlx::query_as::<_, BorrowingRecord>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    async fn list_borrowings_for(&self, borrower_id: i32) -> AppResult<Vec<BorrowingRecord>> {
        let records = sqlx::query_as::<_, BorrowingRecord>(
            "SELECT * FROM borrowings WHERE borrower_id = $1 ORDER BY requested_date DESC, id DESC",
        )
        .bind(borrower_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn get_returning(&self, id: i32) -> AppResult<ReturningRecord> {
        sqlx::query_as::<_, ReturningRecord>("SELECT * FROM returnings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Return with id {} not found", id)))
    }

    async fn get_disposal(&self, id: i32) -> AppResult<DisposalRecord> {
        sqlx::query_as::<_, DisposalRecord>("SELECT * FROM disposals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Disposal with id {} not found", id)))
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE borrowings SET status = $1, modif_date = $3 WHERE status = $2 AND intended_return_date < $3",
        )
        .bind(BorrowingStatus::Overdue)
        .bind(BorrowingStatus::Released)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgItemTransaction {
    tx: Transaction<'static, Postgres>,
    item: InventoryItem,
}

#[async_trait]
impl ItemTransaction for PgItemTransaction {
    fn item(&self) -> &InventoryItem {
        &self.item
    }

    async fn borrowing(&mut self, id: i32) -> AppResult<BorrowingRecord> {
        sqlx::query_as::<_, BorrowingRecord>("SELECT * FROM borrowings WHERE id = $1 AND item_id = $2 FOR UPDATE")
            .bind(id)
            .bind(self.item.id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    async fn pending_request_exists(&mut self, borrower: &Borrower) -> AppResult<bool> {
        let exists = match borrower.id {
            Some(borrower_id) => sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM borrowings WHERE item_id = $1 AND status = $2 AND borrower_id = $3)",
            )
            .bind(self.item.id)
            .bind(BorrowingStatus::Pending)
            .bind(borrower_id)
            .fetch_one(&mut *self.tx)
            .await?,
            None => sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM borrowings
                    WHERE item_id = $1 AND status = $2 AND borrower_id IS NULL AND borrower_email = $3
                )
                "#,
            )
            .bind(self.item.id)
            .bind(BorrowingStatus::Pending)
            .bind(&borrower.email)
            .fetch_one(&mut *self.tx)
            .await?,
        };
        Ok(exists)
    }

    async fn has_open_records(&mut self) -> AppResult<bool> {
        let open = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrowings WHERE item_id = $1 AND status NOT IN ($2, $3, $4)
            ) OR EXISTS(
                SELECT 1 FROM disposals WHERE item_id = $1 AND status = $5
            )
            "#,
        )
        .bind(self.item.id)
        .bind(BorrowingStatus::Rejected)
        .bind(BorrowingStatus::Cancelled)
        .bind(BorrowingStatus::Returned)
        .bind(DisposalStatus::Pending)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(open)
    }

    async fn insert_borrowing(&mut self, new: &NewBorrowing) -> AppResult<BorrowingRecord> {
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            INSERT INTO borrowings (
                item_id, quantity, borrower_type, borrower_id, borrower_name, borrower_email,
                purpose, requested_date, intended_borrow_date, intended_return_date, status, modif_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $8)
            RETURNING *
            "#,
        )
        .bind(new.item_id)
        .bind(new.quantity)
        .bind(new.borrower.borrower_type)
        .bind(new.borrower.id)
        .bind(&new.borrower.name)
        .bind(&new.borrower.email)
        .bind(&new.purpose)
        .bind(new.requested_date)
        .bind(new.intended_borrow_date)
        .bind(new.intended_return_date)
        .bind(BorrowingStatus::Pending)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn update_borrowing(&mut self, record: &BorrowingRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE borrowings SET
                status = $2, released_date = $3, actual_return_date = $4,
                condition_on_borrow = $5, condition_on_return = $6,
                decided_by = $7, decided_by_name = $8, decision_reason = $9, decision_date = $10,
                modif_date = $11
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.released_date)
        .bind(record.actual_return_date)
        .bind(record.condition_on_borrow)
        .bind(record.condition_on_return)
        .bind(record.decided_by)
        .bind(&record.decided_by_name)
        .bind(&record.decision_reason)
        .bind(record.decision_date)
        .bind(record.modif_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn returning(&mut self, id: i32) -> AppResult<ReturningRecord> {
        sqlx::query_as::<_, ReturningRecord>("SELECT * FROM returnings WHERE id = $1 AND item_id = $2 FOR UPDATE")
            .bind(id)
            .bind(self.item.id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Return with id {} not found", id)))
    }

    async fn returning_for_borrowing(&mut self, borrowing_id: i32) -> AppResult<Option<ReturningRecord>> {
        let record = sqlx::query_as::<_, ReturningRecord>(
            "SELECT * FROM returnings WHERE borrowing_id = $1 FOR UPDATE",
        )
        .bind(borrowing_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn insert_returning(&mut self, new: &NewReturning) -> AppResult<ReturningRecord> {
        sqlx::query_as::<_, ReturningRecord>(
            r#"
            INSERT INTO returnings (
                borrowing_id, item_id, condition_before, condition_after, damage_severity,
                damage_description, actual_return_date, is_late, late_days, penalty_fee,
                damage_fee, total_fee, is_fee_paid, status, notes, crea_date, modif_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, $14, $15, $15)
            RETURNING *
            "#,
        )
        .bind(new.borrowing_id)
        .bind(new.item_id)
        .bind(new.condition_before)
        .bind(new.condition_after)
        .bind(new.damage_severity)
        .bind(&new.damage_description)
        .bind(new.actual_return_date)
        .bind(new.assessment.is_late)
        .bind(new.assessment.late_days)
        .bind(new.assessment.penalty_fee)
        .bind(new.assessment.damage_fee)
        .bind(new.assessment.total_fee)
        .bind(ReturningStatus::Pending)
        .bind(&new.notes)
        .bind(new.submitted_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("A return already exists for borrowing {}", new.borrowing_id))
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn update_returning(&mut self, record: &ReturningRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE returnings SET
                condition_before = $2, condition_after = $3, damage_severity = $4,
                damage_description = $5, actual_return_date = $6, is_late = $7, late_days = $8,
                penalty_fee = $9, damage_fee = $10, total_fee = $11, is_fee_paid = $12,
                status = $13, notes = $14, decided_by = $15, decided_by_name = $16,
                decision_date = $17, modif_date = $18
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.condition_before)
        .bind(record.condition_after)
        .bind(record.damage_severity)
        .bind(&record.damage_description)
        .bind(record.actual_return_date)
        .bind(record.is_late)
        .bind(record.late_days)
        .bind(record.penalty_fee)
        .bind(record.damage_fee)
        .bind(record.total_fee)
        .bind(record.is_fee_paid)
        .bind(record.status)
        .bind(&record.notes)
        .bind(record.decided_by)
        .bind(&record.decided_by_name)
        .bind(record.decision_date)
        .bind(record.modif_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn disposal(&mut self, id: i32) -> AppResult<DisposalRecord> {
        sqlx::query_as::<_, DisposalRecord>("SELECT * FROM disposals WHERE id = $1 AND item_id = $2 FOR UPDATE")
            .bind(id)
            .bind(self.item.id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Disposal with id {} not found", id)))
    }

    async fn insert_disposal(&mut self, new: &NewDisposal) -> AppResult<DisposalRecord> {
        let record = sqlx::query_as::<_, DisposalRecord>(
            r#"
            INSERT INTO disposals (
                item_id, disposal_quantity, disposal_method, reason, status,
                original_cost, salvage_value, requested_by, requested_by_name, crea_date, modif_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(new.item_id)
        .bind(new.disposal_quantity)
        .bind(new.disposal_method)
        .bind(&new.reason)
        .bind(DisposalStatus::Pending)
        .bind(new.original_cost)
        .bind(new.salvage_value)
        .bind(new.requested_by)
        .bind(&new.requested_by_name)
        .bind(new.submitted_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn update_disposal(&mut self, record: &DisposalRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE disposals SET
                status = $2, decided_by = $3, decided_by_name = $4, decision_date = $5, modif_date = $6
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.decided_by)
        .bind(&record.decided_by_name)
        .bind(record.decision_date)
        .bind(record.modif_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>, item: &InventoryItem) -> AppResult<()> {
        let PgItemTransaction { mut tx, .. } = *self;
        sqlx::query(
            r#"
            UPDATE inventory_items SET
                name = $2, description = $3, location = $4, quantity = $5,
                borrowed_quantity = $6, maintenance_quantity = $7, calibration_quantity = $8,
                disposal_quantity = $9, status = $10, condition = $11, maintenance_needs = $12,
                unit_cost = $13, modif_date = $14
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.location)
        .bind(item.quantity)
        .bind(item.borrowed_quantity)
        .bind(item.maintenance_quantity)
        .bind(item.calibration_quantity)
        .bind(item.disposal_quantity)
        .bind(item.status)
        .bind(item.condition)
        .bind(item.maintenance_needs)
        .bind(item.unit_cost)
        .bind(item.modif_date)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_removal(self: Box<Self>) -> AppResult<()> {
        let PgItemTransaction { mut tx, item } = *self;
        // returnings, borrowings and disposals cascade
        sqlx::query("DELETE FROM inventory_items WHERE id = $1")
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
