// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic retry of records that failed the single-record send path.
//!
//! Every [`RETRY_INTERVAL`] the persisted failed list is walked from the most
//! recently added entry to the oldest. Each entry gets one send attempt per
//! pass; an entry that has already failed more than [`MAX_RETRY_COUNT`]
//! retries is dropped without touching the network. An entry is therefore
//! attempted at most four times, at retry counts 0 through 3.
//!
//! Delivery during a pass goes straight to the transport. A failure only bumps
//! the entry's count, it never appends a second copy to the list.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::flusher::LogTransport;
use crate::store::{FailedLogEntry, FailedLogStore};

pub const MAX_RETRY_COUNT: u32 = 3;
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Counts from one retry pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    pub delivered: usize,
    pub dropped: usize,
    pub remaining: usize,
}

enum Resolution {
    Delivered,
    Dropped,
    Failed,
}

/// Runs one pass over the persisted failed list.
pub async fn retry_failed_logs(
    transport: &dyn LogTransport,
    failed: &FailedLogStore,
) -> RetryOutcome {
    let snapshot = failed.load();
    if snapshot.is_empty() {
        return RetryOutcome::default();
    }
    debug!("RETRY | Retrying {} failed logs", snapshot.len());

    let mut resolved: Vec<(FailedLogEntry, Resolution)> = Vec::with_capacity(snapshot.len());
    for entry in snapshot.into_iter().rev() {
        if entry.retry_count > MAX_RETRY_COUNT {
            debug!(
                "RETRY | Dropping log '{}' after {} failed retries",
                entry.record.title, entry.retry_count
            );
            resolved.push((entry, Resolution::Dropped));
            continue;
        }

        let resolution = match transport.send_one(&entry.record).await {
            Ok(()) => Resolution::Delivered,
            Err(e) if entry.retry_count + 1 > MAX_RETRY_COUNT => {
                debug!(
                    "RETRY | Dropping log '{}' after {} failed retries: {}",
                    entry.record.title,
                    entry.retry_count + 1,
                    e
                );
                Resolution::Dropped
            }
            Err(e) => {
                debug!(
                    "RETRY | Retry {} failed for log '{}': {}",
                    entry.retry_count + 1,
                    entry.record.title,
                    e
                );
                Resolution::Failed
            }
        };
        resolved.push((entry, resolution));
    }

    let mut outcome = RetryOutcome::default();
    // Entries appended while the pass was awaiting the network are left as-is.
    failed.update(|entries| {
        for (entry, resolution) in &resolved {
            let Some(pos) = entries.iter().position(|e| e == entry) else {
                continue;
            };
            match resolution {
                Resolution::Delivered => {
                    entries.remove(pos);
                    outcome.delivered += 1;
                }
                Resolution::Dropped => {
                    entries.remove(pos);
                    outcome.dropped += 1;
                }
                Resolution::Failed => entries[pos].retry_count += 1,
            }
        }
        outcome.remaining = entries.len();
    });

    debug!(
        "RETRY | Pass complete: {} delivered, {} dropped, {} remaining",
        outcome.delivered, outcome.dropped, outcome.remaining
    );
    outcome
}

/// Spawns the retry loop. The first pass runs one `period` after spawning.
///
/// Cancelling `cancel_token` also abandons an in-flight pass; entries it had
/// not yet written back keep their previous retry counts.
pub fn spawn_retry_loop(
    transport: Arc<dyn LogTransport>,
    failed: Arc<FailedLogStore>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = retry_failed_logs(transport.as_ref(), &failed) => {}
                        _ = cancel_token.cancelled() => {
                            debug!("RETRY | Retry pass interrupted");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("RETRY | Retry loop stopped");
                    break;
                }
            }
        }
    })
}
