//! Business logic services

pub mod borrowings;
pub mod disposals;
pub mod email;
pub mod inventory;
pub mod notifier;
pub mod otp;
pub mod redis;
pub mod returns;
pub mod sweep;

use serde::Serialize;
use std::{sync::Arc, time::Duration};

use crate::{
    circulation::Clock,
    config::AppConfig,
    repository::{ChallengeStore, CirculationStore},
};

/// Result of a committed operation plus any notification that did not go out
#[derive(Debug, Clone, Serialize)]
pub struct Committed<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Committed<T> {
    pub fn new(record: T, warnings: Vec<String>) -> Self {
        Self { record, warnings }
    }
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub inventory: inventory::InventoryService,
    pub borrowings: borrowings::BorrowingService,
    pub returns: returns::ReturnService,
    pub disposals: disposals::DisposalService,
    pub otp: otp::OtpService,
    pub sweep: sweep::SweepService,
}

impl Services {
    /// Wire all services over the given backends
    pub fn new(
        store: Arc<dyn CirculationStore>,
        challenges: Arc<dyn ChallengeStore>,
        notifier: Arc<dyn notifier::Notifier>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let dispatcher = notifier::Dispatcher::new(notifier, Duration::from_secs(config.notifier.timeout_seconds));
        let otp = otp::OtpService::new(challenges, dispatcher.clone(), clock.clone(), config.otp.clone());

        Self {
            inventory: inventory::InventoryService::new(store.clone(), clock.clone()),
            borrowings: borrowings::BorrowingService::new(
                store.clone(),
                otp.clone(),
                dispatcher.clone(),
                clock.clone(),
            ),
            returns: returns::ReturnService::new(
                store.clone(),
                dispatcher,
                clock.clone(),
                config.fees.clone(),
            ),
            disposals: disposals::DisposalService::new(store.clone(), clock.clone()),
            sweep: sweep::SweepService::new(store, otp.clone(), clock),
            otp,
        }
    }
}
