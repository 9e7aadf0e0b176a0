//! Borrowing lifecycle
//!
//! Requests only re-check availability; stock is reserved when the units
//! are released and given back when the return is approved.

use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::{
    notifier::{Dispatcher, TemplateKind},
    otp::OtpService,
    Committed,
};
use crate::{
    circulation::{available, can_borrow, reconciliation::apply, Clock, CounterChange, Impact},
    error::{AppError, AppResult},
    models::{
        borrowing::{BorrowDecision, BorrowRequest, Borrower, GuestBorrowRequest, NewBorrowing},
        otp::{OtpChallenge, OtpPurpose},
        Actor, BorrowingRecord,
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct BorrowingService {
    store: Arc<dyn CirculationStore>,
    otp: OtpService,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

fn check_request(request: &BorrowRequest) -> AppResult<()> {
    request.validate()?;
    request.check_dates().map_err(AppError::Validation)
}

impl BorrowingService {
    pub fn new(store: Arc<dyn CirculationStore>, otp: OtpService, dispatcher: Dispatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            otp,
            dispatcher,
            clock,
        }
    }

    /// Request units for the authenticated borrower
    pub async fn submit(&self, actor: &Actor, request: BorrowRequest) -> AppResult<Committed<BorrowingRecord>> {
        check_request(&request)?;
        self.gate(request.item_id).await?;
        self.open_request(Borrower::from_actor(actor), request, None).await
    }

    /// Request units for a guest whose email was verified.
    ///
    /// The verification is used up only when the request is recorded; a
    /// refused request leaves it usable.
    pub async fn submit_guest(&self, request: GuestBorrowRequest) -> AppResult<Committed<BorrowingRecord>> {
        request.validate()?;
        request.request.check_dates().map_err(AppError::Validation)?;
        self.gate(request.request.item_id).await?;

        let borrower = Borrower::guest(&request.name, &request.email);
        let verification = self
            .otp
            .verified_challenge(&borrower.email, OtpPurpose::GuestRequest)
            .await?;
        self.open_request(borrower, request.request, Some(verification)).await
    }

    /// Eligibility check on the current item state, before any transaction
    async fn gate(&self, item_id: i32) -> AppResult<()> {
        let item = self.store.get_item(item_id).await?;
        if let Err(reason) = can_borrow(&item) {
            tracing::debug!(item_id, reason = %reason, "Borrow request refused");
            return Err(reason.into());
        }
        Ok(())
    }

    async fn open_request(
        &self,
        borrower: Borrower,
        request: BorrowRequest,
        verification: Option<OtpChallenge>,
    ) -> AppResult<Committed<BorrowingRecord>> {
        let now = self.clock.now();
        let mut tx = self.store.begin(request.item_id).await?;
        let item = tx.item().clone();

        can_borrow(&item)?;
        let available = available(&item);
        if request.quantity > available {
            return Err(AppError::Conflict(format!(
                "Requested {} units of item {} but only {} available",
                request.quantity, item.id, available
            )));
        }
        if tx.pending_request_exists(&borrower).await? {
            return Err(AppError::Conflict(format!(
                "A pending request for item {} already exists for this borrower",
                item.id
            )));
        }

        let record = tx
            .insert_borrowing(&NewBorrowing {
                item_id: item.id,
                quantity: request.quantity,
                borrower,
                purpose: request.purpose,
                requested_date: now,
                intended_borrow_date: request.intended_borrow_date,
                intended_return_date: request.intended_return_date,
            })
            .await?;
        // dropping `tx` on a failed redeem discards the insert
        if let Some(challenge) = verification {
            self.otp.redeem(&challenge).await?;
        }
        tx.commit(&item).await?;

        tracing::info!(
            item_id = item.id,
            borrowing_id = record.id,
            borrower_type = %record.borrower_type,
            quantity = record.quantity,
            "Borrow request submitted"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &record.borrower_email,
                TemplateKind::BorrowRequestReceived,
                json!({
                    "borrowing_id": record.id,
                    "item_name": item.name,
                    "quantity": record.quantity,
                }),
            )
            .await;
        Ok(Committed::new(record, warnings))
    }

    /// Approve or reject a pending request; approval re-checks availability
    pub async fn decide(
        &self,
        actor: &Actor,
        id: i32,
        decision: BorrowDecision,
        reason: Option<String>,
    ) -> AppResult<Committed<BorrowingRecord>> {
        actor.require_admin()?;
        let now = self.clock.now();
        let item_id = self.store.get_borrowing(id).await?.item_id;
        let mut tx = self.store.begin(item_id).await?;
        let item = tx.item().clone();
        let mut record = tx.borrowing(id).await?;
        let from = record.status;

        record.status = match decision {
            BorrowDecision::Approve => {
                let next = record.status.approve()?;
                let available = available(&item);
                if record.quantity > available {
                    return Err(AppError::Conflict(format!(
                        "Cannot approve {} units of item {}: only {} available",
                        record.quantity, item.id, available
                    )));
                }
                next
            }
            BorrowDecision::Reject => record.status.reject()?,
        };
        record.record_decision(actor, reason, now);
        tx.update_borrowing(&record).await?;
        tx.commit(&item).await?;

        tracing::info!(
            item_id,
            borrowing_id = id,
            from = %from,
            to = %record.status,
            decided_by = actor.id,
            "Borrow request decided"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &record.borrower_email,
                TemplateKind::BorrowRequestDecided,
                json!({
                    "borrowing_id": record.id,
                    "status": record.status,
                    "reason": record.decision_reason,
                }),
            )
            .await;
        Ok(Committed::new(record, warnings))
    }

    /// Hand the units out; this is where they are reserved
    pub async fn release(&self, actor: &Actor, id: i32) -> AppResult<Committed<BorrowingRecord>> {
        actor.require_admin()?;
        let now = self.clock.now();
        let item_id = self.store.get_borrowing(id).await?.item_id;
        let mut tx = self.store.begin(item_id).await?;
        let item = tx.item().clone();
        let mut record = tx.borrowing(id).await?;

        record.status = record.status.release()?;
        let next = apply(&item, CounterChange::Reserve(Impact::Borrowed, record.quantity), now)?;
        record.released_date = Some(now);
        record.condition_on_borrow = Some(item.condition);
        record.modif_date = now;
        tx.update_borrowing(&record).await?;
        tx.commit(&next).await?;

        tracing::info!(
            item_id,
            borrowing_id = id,
            quantity = record.quantity,
            borrowed = next.borrowed_quantity,
            available = available(&next),
            "Borrowing released"
        );

        let mut warnings = Vec::new();
        self.dispatcher
            .dispatch_into(
                &mut warnings,
                &record.borrower_email,
                TemplateKind::BorrowingReleased,
                json!({
                    "borrowing_id": record.id,
                    "item_name": next.name,
                    "quantity": record.quantity,
                    "intended_return_date": record.intended_return_date.to_rfc3339(),
                }),
            )
            .await;
        Ok(Committed::new(record, warnings))
    }

    /// Withdraw an approved request before release
    pub async fn cancel(&self, actor: &Actor, id: i32) -> AppResult<BorrowingRecord> {
        let now = self.clock.now();
        let existing = self.store.get_borrowing(id).await?;
        if !actor.is_admin() && !existing.is_borrowed_by(actor) {
            return Err(AppError::Authorization(
                "Only the borrower or an administrator can cancel a borrowing".to_string(),
            ));
        }
        let mut tx = self.store.begin(existing.item_id).await?;
        let item = tx.item().clone();
        let mut record = tx.borrowing(id).await?;
        record.status = record.status.cancel()?;
        record.modif_date = now;
        tx.update_borrowing(&record).await?;
        tx.commit(&item).await?;

        tracing::info!(item_id = item.id, borrowing_id = id, cancelled_by = actor.id, "Borrowing cancelled");
        Ok(record)
    }

    pub async fn get(&self, actor: &Actor, id: i32) -> AppResult<BorrowingRecord> {
        let record = self.store.get_borrowing(id).await?;
        if !actor.is_admin() && !record.is_borrowed_by(actor) {
            return Err(AppError::Authorization("Not your borrowing".to_string()));
        }
        Ok(record.labelled(self.clock.now()))
    }

    /// Borrowings of `borrower_id`, newest first
    pub async fn list_for(&self, actor: &Actor, borrower_id: i32) -> AppResult<Vec<BorrowingRecord>> {
        if !actor.is_admin() && actor.id != borrower_id {
            return Err(AppError::Authorization("Not your borrowings".to_string()));
        }
        let now = self.clock.now();
        Ok(self
            .store
            .list_borrowings_for(borrower_id)
            .await?
            .into_iter()
            .map(|r| r.labelled(now))
            .collect())
    }
}
