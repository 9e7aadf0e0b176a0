//! Disposal lifecycle
//!
//! Units are reserved in `disposal_quantity` as soon as a disposal is
//! submitted. Cancelling gives them back; completing keeps them reserved
//! for good.

use rust_decimal::Decimal;
use std::sync::Arc;
use validator::Validate;

use crate::{
    circulation::{available, can_dispose, reconciliation::apply, Clock, CounterChange, Impact, Ineligible},
    error::{AppError, AppResult},
    models::{
        disposal::{DisposalDecision, DisposalRequest, NewDisposal},
        Actor, DisposalRecord,
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct DisposalService {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
}

impl DisposalService {
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn submit(&self, actor: &Actor, request: DisposalRequest) -> AppResult<DisposalRecord> {
        actor.require_staff()?;
        request.validate()?;
        request.check_amounts().map_err(AppError::Validation)?;

        // category gate before any transaction
        let current = self.store.get_item(request.item_id).await?;
        if !current.category.is_disposable() {
            return Err(Ineligible::NotDisposable(current.id, current.category).into());
        }

        let now = self.clock.now();
        let mut tx = self.store.begin(request.item_id).await?;
        let item = tx.item().clone();
        if let Err(e) = can_dispose(&item, request.quantity) {
            tracing::debug!(item_id = item.id, quantity = request.quantity, error = %e, "Disposal refused");
            return Err(e);
        }
        let next = apply(&item, CounterChange::Reserve(Impact::Disposal, request.quantity), now)?;

        let original_cost = match (request.original_cost, item.unit_cost) {
            (Some(cost), _) => Some(cost),
            (None, Some(unit)) => Some(unit.checked_mul(Decimal::from(request.quantity)).ok_or_else(|| {
                AppError::Validation(format!(
                    "original_cost of {} units at {} is out of range",
                    request.quantity, unit
                ))
            })?),
            (None, None) => None,
        };
        let record = tx
            .insert_disposal(&NewDisposal {
                item_id: item.id,
                disposal_quantity: request.quantity,
                disposal_method: request.method,
                reason: request.reason,
                original_cost,
                salvage_value: request.salvage_value,
                requested_by: actor.id,
                requested_by_name: actor.name.clone(),
                submitted_at: now,
            })
            .await?;
        tx.commit(&next).await?;

        tracing::info!(
            item_id = item.id,
            disposal_id = record.id,
            quantity = record.disposal_quantity,
            method = %record.disposal_method,
            reserved = next.disposal_quantity,
            available = available(&next),
            "Disposal submitted"
        );
        Ok(record)
    }

    pub async fn decide(&self, actor: &Actor, id: i32, decision: DisposalDecision) -> AppResult<DisposalRecord> {
        actor.require_admin()?;
        let now = self.clock.now();
        let item_id = self.store.get_disposal(id).await?.item_id;
        let mut tx = self.store.begin(item_id).await?;
        let item = tx.item().clone();
        let mut record = tx.disposal(id).await?;
        let from = record.status;

        let next = match decision {
            DisposalDecision::Complete => {
                record.status = record.status.complete()?;
                item
            }
            DisposalDecision::Cancel => {
                record.status = record.status.cancel()?;
                apply(&item, CounterChange::Release(Impact::Disposal, record.disposal_quantity), now)?
            }
        };
        record.decided_by = Some(actor.id);
        record.decided_by_name = Some(actor.name.clone());
        record.decision_date = Some(now);
        record.modif_date = now;
        tx.update_disposal(&record).await?;
        tx.commit(&next).await?;

        tracing::info!(
            item_id,
            disposal_id = id,
            from = %from,
            to = %record.status,
            reserved = next.disposal_quantity,
            "Disposal decided"
        );
        Ok(record)
    }

    pub async fn get(&self, id: i32) -> AppResult<DisposalRecord> {
        self.store.get_disposal(id).await
    }
}
