//! Session expiry sweep background task.
//!
//! Periodically tears down sessions that outlived the configured maximum
//! lifetime. The tick skips missed iterations instead of bursting, so a
//! slow sweep never overlaps its own next run.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::services::SessionService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the expiry sweep loop until cancelled.
pub async fn start_session_expiry_sweep(
    service: Arc<SessionService>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        target: "cb.tasks.session_expiry",
        interval_seconds = interval.as_secs(),
        "Session expiry sweep started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = service.expire_sessions().await {
                    error!(
                        target: "cb.tasks.session_expiry",
                        error = %e,
                        "Session expiry sweep failed"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "cb.tasks.session_expiry",
                    "Session expiry sweep received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}
