//! Inventory intake and maintenance

use std::sync::Arc;
use validator::Validate;

use crate::{
    circulation::{available, can_borrow, reconciliation::apply, Clock, CounterChange},
    error::{AppError, AppResult},
    models::{
        inventory::{AdjustQuantity, CreateItem, ItemDetails, ServiceHold, UpdateItem},
        Actor, InventoryItem,
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
}

pub fn details(item: InventoryItem) -> ItemDetails {
    ItemDetails {
        available: available(&item),
        borrowable: can_borrow(&item).is_ok(),
        item,
    }
}

impl InventoryService {
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, actor: &Actor, data: CreateItem) -> AppResult<ItemDetails> {
        actor.require_admin()?;
        data.validate()?;
        data.check_amounts().map_err(AppError::Validation)?;
        let item = self.store.insert_item(&data, self.clock.now()).await?;
        tracing::info!(item_id = item.id, category = %item.category, quantity = item.quantity, "Item created");
        Ok(details(item))
    }

    pub async fn get(&self, id: i32) -> AppResult<ItemDetails> {
        Ok(details(self.store.get_item(id).await?))
    }

    pub async fn list(&self) -> AppResult<Vec<ItemDetails>> {
        Ok(self.store.list_items().await?.into_iter().map(details).collect())
    }

    /// Change descriptive attributes; counters are untouched
    pub async fn update(&self, actor: &Actor, id: i32, data: UpdateItem) -> AppResult<ItemDetails> {
        actor.require_admin()?;
        data.validate()?;
        data.check_amounts().map_err(AppError::Validation)?;
        let tx = self.store.begin(id).await?;
        let mut next = tx.item().clone();
        data.apply_to(&mut next);
        next.modif_date = self.clock.now();
        tx.commit(&next).await?;
        tracing::info!(item_id = id, status = %next.status, condition = %next.condition, "Item updated");
        Ok(details(next))
    }

    pub async fn adjust_quantity(&self, actor: &Actor, id: i32, data: AdjustQuantity) -> AppResult<ItemDetails> {
        actor.require_admin()?;
        data.validate()?;
        let (from, item) = self.reconcile(id, CounterChange::SetQuantity(data.quantity)).await?;
        tracing::info!(item_id = id, from = from.quantity, to = item.quantity, "Item quantity adjusted");
        Ok(details(item))
    }

    /// Put units on a maintenance or calibration hold
    pub async fn hold_for_service(&self, actor: &Actor, id: i32, hold: ServiceHold) -> AppResult<ItemDetails> {
        actor.require_admin()?;
        hold.validate()?;
        let (_, item) = self
            .reconcile(id, CounterChange::Reserve(hold.kind.into(), hold.quantity))
            .await?;
        tracing::info!(
            item_id = id,
            kind = %hold.kind,
            quantity = hold.quantity,
            held = item.service_quantity(hold.kind),
            "Units held for service"
        );
        Ok(details(item))
    }

    pub async fn release_from_service(&self, actor: &Actor, id: i32, hold: ServiceHold) -> AppResult<ItemDetails> {
        actor.require_admin()?;
        hold.validate()?;
        let (_, item) = self
            .reconcile(id, CounterChange::Release(hold.kind.into(), hold.quantity))
            .await?;
        tracing::info!(
            item_id = id,
            kind = %hold.kind,
            quantity = hold.quantity,
            held = item.service_quantity(hold.kind),
            "Units released from service"
        );
        Ok(details(item))
    }

    /// Remove an item with no outstanding impacts or open records
    pub async fn delete(&self, actor: &Actor, id: i32) -> AppResult<()> {
        actor.require_admin()?;
        let mut tx = self.store.begin(id).await?;
        if tx.item().has_impacts() || tx.has_open_records().await? {
            return Err(AppError::Conflict(format!(
                "Item {} still has units out or open records",
                id
            )));
        }
        tx.commit_removal().await?;
        tracing::info!(item_id = id, "Item deleted");
        Ok(())
    }

    /// Store connectivity, for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    async fn reconcile(&self, id: i32, change: CounterChange) -> AppResult<(InventoryItem, InventoryItem)> {
        let tx = self.store.begin(id).await?;
        let before = tx.item().clone();
        let next = apply(&before, change, self.clock.now())?;
        tx.commit(&next).await?;
        Ok((before, next))
    }
}
