//! Sync worker: the single active upstream caller.

use crate::errors::CbError;
use crate::firewall::{rules, FirewallApi};
use crate::observability::metrics;
use crate::repositories::WhitelistStore;
use crate::sync::{SyncAck, SyncQueue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Drains queued sync requests on a fixed tick and reconciles the upstream
/// firewall with the live whitelist state.
///
/// Ticks never overlap: the loop awaits each run before taking the next
/// tick, and missed ticks are skipped outright. The empty-batch short
/// circuit is the rate limiter — bursts within one tick collapse to at
/// most one upstream call.
pub struct SyncWorker {
    queue: Arc<dyn SyncQueue>,
    store: Arc<dyn WhitelistStore>,
    firewall: Arc<dyn FirewallApi>,
    firewall_id: Option<String>,
    max_ips_per_rule: usize,
    tick: Duration,
}

impl SyncWorker {
    #[must_use]
    pub fn new(
        queue: Arc<dyn SyncQueue>,
        store: Arc<dyn WhitelistStore>,
        firewall: Arc<dyn FirewallApi>,
        firewall_id: Option<String>,
        max_ips_per_rule: usize,
        tick: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            firewall,
            firewall_id,
            max_ips_per_rule,
            tick,
        }
    }

    /// Run the tick loop until cancelled.
    ///
    /// A failed run is logged and dropped; the next tick retries naturally
    /// using then-current state.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(0) => {}
                        Ok(acked) => {
                            debug!(
                                target: "cb.sync.worker",
                                acked = acked,
                                "Sync tick acknowledged batch"
                            );
                        }
                        Err(e) => {
                            error!(
                                target: "cb.sync.worker",
                                error = %e,
                                "Failed to update firewall rules"
                            );
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!(target: "cb.sync.worker", "Sync worker received shutdown signal, exiting");
                    break;
                }
            }
        }
    }

    /// Execute one tick: drain, derive, call upstream, acknowledge.
    ///
    /// Returns the number of acknowledged requests (0 when this instance is
    /// not the leader, no firewall is configured, or the batch was empty).
    #[instrument(skip_all, name = "cb.sync.run_once")]
    pub async fn run_once(&self) -> Result<usize, CbError> {
        let Some(firewall_id) = self.firewall_id.as_deref() else {
            return Ok(0);
        };

        if !self.queue.try_acquire_leadership().await? {
            return Ok(0);
        }

        let batch = self.queue.drain().await?;
        if batch.is_empty() {
            trace!(
                target: "cb.sync.worker",
                firewall_id = %firewall_id,
                "No changes to apply"
            );
            return Ok(0);
        }

        let start = Instant::now();

        // Always the authoritative live state, never the batch payload.
        let entries = self.store.get_all_active().await?;
        let rule_set = rules::build_rule_set(&entries, self.max_ips_per_rule);

        info!(
            target: "cb.sync.worker",
            firewall_id = %firewall_id,
            rule_count = rule_set.len(),
            batch_size = batch.len(),
            "Syncing rules with cloud firewall"
        );

        match self.firewall.set_rules(firewall_id, &rule_set).await {
            Ok(response) if response.is_success() => {
                metrics::record_firewall_sync("success", rule_set.len(), start.elapsed());
                // An empty-action success still acknowledges the whole
                // batch: the store read above may already include a row
                // whose enqueuing request raced in after the drain.
                // Publication is best-effort per request; a waiter whose
                // acknowledgment is lost times out and the next mutation
                // syncs again.
                let mut acked = 0;
                for request in &batch {
                    match self.queue.publish_ack(&SyncAck { id: request.id }).await {
                        Ok(()) => acked += 1,
                        Err(e) => {
                            warn!(
                                target: "cb.sync.worker",
                                request_id = %request.id,
                                error = %e,
                                "Failed to publish sync acknowledgment"
                            );
                        }
                    }
                }
                info!(target: "cb.sync.worker", "Successfully updated firewall rules");
                Ok(acked)
            }
            Ok(response) => {
                metrics::record_firewall_sync("error", rule_set.len(), start.elapsed());
                let failed = response
                    .actions
                    .iter()
                    .filter(|action| action.error.is_some())
                    .count();
                // No acknowledgment for the batch: waiters time out and the
                // next tick retries. Partial acknowledgment is disallowed.
                Err(CbError::Upstream(format!(
                    "{failed} rule actions reported errors"
                )))
            }
            Err(e) => {
                metrics::record_firewall_sync("error", rule_set.len(), start.elapsed());
                Err(e)
            }
        }
    }
}
