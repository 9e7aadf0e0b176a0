//! Returns and their fees

use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::{
    notifier::{Dispatcher, TemplateKind},
    Committed,
};
use crate::{
    circulation::{available, fees, reconciliation::apply, Clock, CounterChange, Impact},
    config::FeesConfig,
    error::{AppError, AppResult},
    models::{
        returning::{NewReturning, ReturnDecision, ReturnSubmission},
        Actor, ReturningRecord, ReturningStatus,
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct ReturnService {
    store: Arc<dyn CirculationStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    fees: FeesConfig,
}

impl ReturnService {
    pub fn new(store: Arc<dyn CirculationStore>, dispatcher: Dispatcher, clock: Arc<dyn Clock>, fees: FeesConfig) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            fees,
        }
    }

    /// Declare the units returned and compute the fees.
    ///
    /// After a rejected return the same record is submitted again.
    pub async fn submit(
        &self,
        actor: &Actor,
        borrowing_id: i32,
        submission: ReturnSubmission,
    ) -> AppResult<Committed<ReturningRecord>> {
        submission.validate()?;
        submission.check_damage().map_err(AppError::Validation)?;

        let existing = self.store.get_borrowing(borrowing_id).await?;
        if !actor.is_admin() && !existing.is_borrowed_by(actor) {
            return Err(AppError::Authorization(
                "Only the borrower or an administrator can return a borrowing".to_string(),
            ));
        }

        let now = self.clock.now();
        let actual_return_date = submission.actual_return_date.unwrap_or(now);
        if actual_return_date > now {
            return Err(AppError::Validation("Return date is in the future".to_string()));
        }
        let mut tx = self.store.begin(existing.item_id).await?;
        let item = tx.item().clone();
        let mut borrowing = tx.borrowing(borrowing_id).await?;

        if let Some(released) = borrowing.released_date {
            if actual_return_date < released {
                return Err(AppError::Validation(
                    "Return date is before the units were released".to_string(),
                ));
            }
        }

        let prior = tx.returning_for_borrowing(borrowing_id).await?;
        if let Some(ref returning) = prior {
            if returning.status != ReturningStatus::Rejected {
                return Err(AppError::Conflict(format!(
                    "A return already exists for borrowing {}",
                    borrowing_id
                )));
            }
        }

        let from = borrowing.status;
        borrowing.status = borrowing.status.request_return()?;

        let assessment = fees::assess(
            &self.fees,
            borrowing.intended_return_date,
            actual_return_date,
            submission.damage_severity,
        );
        let new = NewReturning {
            borrowing_id,
            item_id: item.id,
            condition_before: borrowing.condition_on_borrow,
            condition_after: submission.condition_after,
            damage_severity: submission.damage_severity,
            damage_description: submission.damage_description,
            actual_return_date,
            assessment,
            notes: submission.notes,
            submitted_at: now,
        };

        let returning = match prior {
            Some(mut returning) => {
                returning.resubmit(&new)?;
                tx.update_returning(&returning).await?;
                returning
            }
            None => tx.insert_returning(&new).await?,
        };

        borrowing.actual_return_date = Some(actual_return_date);
        borrowing.condition_on_return = Some(new.condition_after);
        borrowing.modif_date = now;
        tx.update_borrowing(&borrowing).await?;
        tx.commit(&item).await?;

        tracing::info!(
            item_id = item.id,
            borrowing_id,
            returning_id = returning.id,
            from = %from,
            to = %borrowing.status,
            late_days = returning.late_days,
            total_fee = %returning.total_fee,
            "Return submitted"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &borrowing.borrower_email,
                TemplateKind::ReturnSubmitted,
                json!({
                    "borrowing_id": borrowing_id,
                    "returning_id": returning.id,
                    "total_fee": returning.total_fee,
                }),
            )
            .await;
        Ok(Committed::new(returning, warnings))
    }

    /// Approve (units go back into stock) or reject (borrowing stays out)
    pub async fn decide(
        &self,
        actor: &Actor,
        id: i32,
        decision: ReturnDecision,
    ) -> AppResult<Committed<ReturningRecord>> {
        actor.require_admin()?;
        let now = self.clock.now();
        let item_id = self.store.get_returning(id).await?.item_id;
        let mut tx = self.store.begin(item_id).await?;
        let item = tx.item().clone();
        let mut returning = tx.returning(id).await?;
        let mut borrowing = tx.borrowing(returning.borrowing_id).await?;

        let next = match decision {
            ReturnDecision::Approve => {
                returning.status = returning.status.approve()?;
                borrowing.status = borrowing
                    .status
                    .approve_return()
                    .and_then(|s| s.complete_return())?;
                let next = apply(&item, CounterChange::Release(Impact::Borrowed, borrowing.quantity), now)?;
                if returning.total_fee == Decimal::ZERO {
                    returning.is_fee_paid = true;
                    returning.status = returning.status.complete()?;
                }
                next
            }
            ReturnDecision::Reject => {
                returning.status = returning.status.reject()?;
                borrowing.status = borrowing.status.reject_return().and_then(|s| s.resume())?;
                borrowing.actual_return_date = None;
                borrowing.condition_on_return = None;
                item
            }
        };
        returning.decided_by = Some(actor.id);
        returning.decided_by_name = Some(actor.name.clone());
        returning.decision_date = Some(now);
        returning.modif_date = now;
        borrowing.modif_date = now;

        tx.update_returning(&returning).await?;
        tx.update_borrowing(&borrowing).await?;
        tx.commit(&next).await?;

        tracing::info!(
            item_id,
            borrowing_id = borrowing.id,
            returning_id = id,
            returning_status = %returning.status,
            borrowing_status = %borrowing.status,
            borrowed = next.borrowed_quantity,
            available = available(&next),
            "Return decided"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &borrowing.borrower_email,
                TemplateKind::ReturnDecided,
                json!({
                    "returning_id": returning.id,
                    "status": returning.status,
                    "total_fee": returning.total_fee,
                }),
            )
            .await;
        Ok(Committed::new(returning, warnings))
    }

    /// Settle the fees of an approved return
    pub async fn record_fee_payment(&self, actor: &Actor, id: i32) -> AppResult<ReturningRecord> {
        actor.require_admin()?;
        let now = self.clock.now();
        let item_id = self.store.get_returning(id).await?.item_id;
        let mut tx = self.store.begin(item_id).await?;
        let item = tx.item().clone();
        let mut returning = tx.returning(id).await?;

        returning.status = returning.status.complete()?;
        returning.is_fee_paid = true;
        returning.modif_date = now;
        tx.update_returning(&returning).await?;
        tx.commit(&item).await?;

        tracing::info!(item_id, returning_id = id, total_fee = %returning.total_fee, "Return fees paid");
        Ok(returning)
    }

    pub async fn get(&self, actor: &Actor, id: i32) -> AppResult<ReturningRecord> {
        let returning = self.store.get_returning(id).await?;
        if !actor.is_admin() {
            let borrowing = self.store.get_borrowing(returning.borrowing_id).await?;
            if !borrowing.is_borrowed_by(actor) {
                return Err(AppError::Authorization("Not your return".to_string()));
            }
        }
        Ok(returning)
    }
}
