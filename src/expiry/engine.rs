// Expiry reconciliation engine
//
// One cycle:
// 1. Skip if another cycle is in flight (single-flight flag)
// 2. Fetch a bounded batch of expired, active, still-paid entries
// 3. For each entry, map its cid to the free payment instruction and flip it to free
// 4. Per-entry failures are logged and counted; the entry stays paid and is
//    picked up again next cycle
//
// The whole cycle is bounded by a timeout. On expiry the cycle future is dropped,
// which cancels in-flight store and HTTP calls at their next await point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ExpiryConfig;
use crate::entries::{Entry, EntryStore};
use crate::error::{AppResult, ReconcileError};
use crate::payment::PaymentInstructionClient;

/// Engine settings derived from [`ExpiryConfig`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub batch_size: u32,
    pub cycle_timeout: Duration,
    pub max_concurrency: usize,
    pub free_payment_instruction_id: Option<String>,
}

impl From<&ExpiryConfig> for EngineSettings {
    fn from(config: &ExpiryConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            cycle_timeout: config.cycle_timeout(),
            max_concurrency: config.max_concurrency.max(1),
            free_payment_instruction_id: config.free_payment_instruction_id.clone(),
        }
    }
}

/// Counters reported at the end of a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub candidates: usize,
    pub set_to_free: usize,
    pub errors: usize,
    /// Entries left untouched because the free instruction, the payment
    /// client or the entry's cid/piid was missing
    pub skipped: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Another cycle held the single-flight flag
    AlreadyRunning,
    Completed(CycleSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    SetToFree,
    Skipped,
    Failed,
}

/// Clears the single-flight flag on every exit path, including timeout and panic
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    payment_client: RwLock<Option<Arc<dyn PaymentInstructionClient>>>,
    settings: EngineSettings,
    in_flight: AtomicBool,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn EntryStore>, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self {
            store,
            clock,
            payment_client: RwLock::new(None),
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_payment_client(self, client: Arc<dyn PaymentInstructionClient>) -> Self {
        self.attach_payment_client(client);
        self
    }

    pub fn attach_payment_client(&self, client: Arc<dyn PaymentInstructionClient>) {
        *self.payment_client.write() = Some(client);
    }

    pub fn has_payment_client(&self) -> bool {
        self.payment_client.read().is_some()
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one reconciliation cycle
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Expiry cycle already in progress, skipping this trigger");
            return Ok(CycleReport::AlreadyRunning);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let started = Instant::now();
        let span = info_span!("expiry_cycle", cycle_id = %Uuid::new_v4());

        match tokio::time::timeout(
            self.settings.cycle_timeout,
            self.reconcile_batch(started).instrument(span),
        )
        .await
        {
            Ok(Ok(summary)) => Ok(CycleReport::Completed(summary)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                error!(
                    elapsed_ms,
                    timeout_ms = self.settings.cycle_timeout.as_millis() as u64,
                    "❌ CRITICAL: expiry cycle timed out; next scheduled cycle will retry"
                );
                Err(ReconcileError::CycleTimeout { elapsed_ms })
            }
        }
    }

    async fn reconcile_batch(&self, started: Instant) -> Result<CycleSummary, ReconcileError> {
        let now = self.clock.now_epoch_secs();
        let batch_size = self.settings.batch_size;

        let candidates = self
            .store
            .fetch_expired_candidates(now, batch_size)
            .await
            .map_err(|e| {
                error!(now, batch_size, error = %e, "Failed to fetch expired entries");
                ReconcileError::CandidateQuery(e)
            })?;

        if candidates.is_empty() {
            debug!(now, "No expired entries to reconcile");
            return Ok(CycleSummary {
                duration_ms: started.elapsed().as_millis() as u64,
                ..CycleSummary::default()
            });
        }

        info!("🔄 Found {} expired entries to set free", candidates.len());

        let client = self.payment_client.read().clone();
        let client = client.as_deref();
        let free_piid = self.settings.free_payment_instruction_id.as_deref();

        let mut summary = CycleSummary {
            candidates: candidates.len(),
            ..CycleSummary::default()
        };

        let outcomes: Vec<EntryOutcome> = stream::iter(candidates)
            .map(|entry| async move { self.transition_entry(&entry, free_piid, client, now).await })
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                EntryOutcome::SetToFree => summary.set_to_free += 1,
                EntryOutcome::Skipped => summary.skipped += 1,
                EntryOutcome::Failed => summary.errors += 1,
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            duration_ms = summary.duration_ms,
            set_to_free = summary.set_to_free,
            errors = summary.errors,
            skipped = summary.skipped,
            "✓ Expiry cycle completed"
        );

        Ok(summary)
    }

    async fn transition_entry(
        &self,
        entry: &Entry,
        free_piid: Option<&str>,
        client: Option<&dyn PaymentInstructionClient>,
        now: i64,
    ) -> EntryOutcome {
        let (Some(free_piid), Some(client), Some((cid, old_piid))) =
            (free_piid, client, entry.payment_binding())
        else {
            debug!(
                entry_id = %entry.id,
                feed_id = %entry.feed_id,
                "Expired entry left unchanged: missing free instruction, payment client, cid or piid"
            );
            return EntryOutcome::Skipped;
        };

        match self.rebind_to_free(entry, cid, free_piid, client, now).await {
            Ok(()) => {
                info!(
                    entry_id = %entry.id,
                    feed_id = %entry.feed_id,
                    cid,
                    old_piid,
                    new_piid = free_piid,
                    "Entry set to free after expiry"
                );
                EntryOutcome::SetToFree
            }
            Err(e) => {
                error!(
                    entry_id = %entry.id,
                    feed_id = %entry.feed_id,
                    cid,
                    old_piid,
                    new_piid = free_piid,
                    error = %e,
                    "Failed to set expired entry to free"
                );
                EntryOutcome::Failed
            }
        }
    }

    async fn rebind_to_free(
        &self,
        entry: &Entry,
        cid: &str,
        free_piid: &str,
        client: &dyn PaymentInstructionClient,
        now: i64,
    ) -> AppResult<()> {
        client.map_cid(free_piid, cid).await?;
        self.store.mark_entry_free(&entry.id, free_piid, now).await
    }
}
