//! Periodic housekeeping: persist overdue borrowings, drop expired codes

use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::otp::OtpService;
use crate::{circulation::Clock, error::AppResult, repository::CirculationStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    pub overdue_marked: u64,
    pub challenges_purged: u64,
}

#[derive(Clone)]
pub struct SweepService {
    store: Arc<dyn CirculationStore>,
    otp: OtpService,
    clock: Arc<dyn Clock>,
}

impl SweepService {
    pub fn new(store: Arc<dyn CirculationStore>, otp: OtpService, clock: Arc<dyn Clock>) -> Self {
        Self { store, otp, clock }
    }

    /// Run both sweeps once. Safe to repeat and to run alongside requests.
    pub async fn run_once(&self) -> AppResult<SweepReport> {
        let overdue_marked = self.store.mark_overdue(self.clock.now()).await?;
        let challenges_purged = self.otp.purge_expired().await?;
        let report = SweepReport {
            overdue_marked,
            challenges_purged,
        };
        if report != SweepReport::default() {
            tracing::info!(overdue_marked, challenges_purged, "Sweep completed");
        }
        Ok(report)
    }

    /// Run the sweep every `interval` until the runtime shuts down
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Sweep failed");
                }
            }
        })
    }
}
