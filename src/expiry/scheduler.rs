// Expiry scheduler - drives the reconciliation engine on a fixed interval
//
// start() checks that a payment client can be built and that a free
// instruction is configured, runs one cycle immediately, then arms a
// repeating ticker. Each tick spawns its cycle without awaiting it; the
// engine's single-flight flag turns overlapping ticks into no-ops.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::engine::{CycleReport, ReconciliationEngine};
use crate::config::ExpiryConfig;
use crate::payment::PaymentClientFactory;

/// Point-in-time view of the scheduler, served by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub free_instruction_configured: bool,
    pub payment_client_available: bool,
    pub cycle_in_flight: bool,
}

pub struct ExpiryScheduler {
    config: ExpiryConfig,
    engine: Arc<ReconciliationEngine>,
    client_factory: Arc<dyn PaymentClientFactory>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryScheduler {
    pub fn new(
        config: ExpiryConfig,
        engine: Arc<ReconciliationEngine>,
        client_factory: Arc<dyn PaymentClientFactory>,
    ) -> Self {
        Self {
            config,
            engine,
            client_factory,
            ticker: Mutex::new(None),
        }
    }

    /// Start polling. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            info!("Expiry scheduler already running");
            return;
        }

        if !self.engine.has_payment_client() {
            match self.client_factory.build() {
                Ok(client) => self.engine.attach_payment_client(client),
                Err(e) => {
                    error!(error = %e, "❌ Cannot start expiry scheduler: payment instruction client unavailable");
                    drop(ticker);
                    self.stop();
                    return;
                }
            }
        }

        if self.config.free_payment_instruction_id.is_none() {
            error!("❌ Cannot start expiry scheduler: FREE_PAYMENT_INSTRUCTION_ID is not configured");
            drop(ticker);
            self.stop();
            return;
        }

        let engine = self.engine.clone();
        let poll_interval = self.config.poll_interval();

        *ticker = Some(tokio::spawn(async move {
            // The first tick completes immediately
            let mut interval = interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                tokio::spawn(run_scheduled_cycle(engine.clone()));
            }
        }));

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            cycle_timeout_ms = self.config.cycle_timeout_ms,
            "✅ Expiry scheduler started"
        );
    }

    /// Stop polling. Cycles already in flight run to completion.
    pub fn stop(&self) {
        match self.ticker.lock().take() {
            Some(handle) => {
                handle.abort();
                info!("🛑 Expiry scheduler stopped");
            }
            None => debug!("Expiry scheduler stop requested while not running"),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.ticker.lock().is_some(),
            poll_interval_ms: self.config.poll_interval_ms,
            batch_size: self.config.batch_size,
            free_instruction_configured: self.config.free_payment_instruction_id.is_some(),
            payment_client_available: self.engine.has_payment_client(),
            cycle_in_flight: self.engine.is_cycle_in_flight(),
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

/// Task boundary for a scheduled cycle. Every failure ends in a log line.
async fn run_scheduled_cycle(engine: Arc<ReconciliationEngine>) {
    let started = Instant::now();

    match engine.run_cycle().await {
        Ok(CycleReport::Completed(_)) | Ok(CycleReport::AlreadyRunning) => {}
        Err(e) => {
            warn!(
                duration_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Expiry cycle failed; next scheduled cycle will retry"
            );
        }
    }
}
