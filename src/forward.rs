//! Store-and-forward loop that redelivers failed payloads.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::StoreForwardConfig;
use crate::retry::RetryPolicy;
use crate::store::{RetryStore, StoreError, StoredRecord};
use crate::transport::{DeliveryError, Transport};

/// Outcome of one pass over the retry store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: usize,
    pub rescheduled: usize,
    pub discarded: usize,
    /// Records whose store update failed. They go back to pending.
    pub store_errors: usize,
}

impl ForwardReport {
    pub fn is_empty(&self) -> bool {
        self.delivered + self.rescheduled + self.discarded + self.store_errors == 0
    }
}

enum Outcome {
    Delivered,
    Rescheduled,
    Discarded,
}

/// Periodically resends stored records through a transport.
///
/// A failed resend is rescheduled according to the retry policy, using the
/// record's retry count as the attempt number. Once the policy gives up the
/// record is discarded.
pub struct StoreForward<S: ?Sized, T> {
    store: Arc<S>,
    transport: T,
    policy: RetryPolicy,
    batch_size: usize,
    interval: Duration,
    send_timeout: Duration,
}

impl<S, T> StoreForward<S, T>
where
    S: RetryStore + ?Sized,
    T: Transport,
{
    pub fn new(store: Arc<S>, transport: T) -> Self {
        Self {
            store,
            transport,
            policy: RetryPolicy::default(),
            batch_size: 100,
            interval: Duration::from_secs(10),
            send_timeout: Duration::from_secs(30),
        }
    }

    /// Create a loop using the configured policy and cadence.
    pub fn from_config(store: Arc<S>, transport: T, config: &StoreForwardConfig) -> Self {
        Self::new(store, transport)
            .with_policy(config.retry_policy())
            .with_batch_size(config.batch_size)
            .with_interval(config.interval())
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Maximum records claimed per pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Deadline for a single resend.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Claim due records and try each of them once.
    ///
    /// A store error on one record does not end the pass. Once the batch is
    /// done, records still in flight because of such an error are returned to
    /// pending, so they are tried again on a later pass. A record that was
    /// delivered but could not be marked complete is delivered again.
    pub async fn run_once(&self) -> Result<ForwardReport, StoreError> {
        let claimed = self.store.claim_due(self.batch_size, Utc::now()).await?;
        let mut report = ForwardReport::default();

        for stored in claimed {
            match self.settle(&stored).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Rescheduled) => report.rescheduled += 1,
                Ok(Outcome::Discarded) => report.discarded += 1,
                Err(e) => {
                    error!(
                        correlation_id = %stored.record.correlation_id,
                        record_id = stored.id.0,
                        error = %e,
                        "Failed to update retry record"
                    );
                    report.store_errors += 1;
                }
            }
        }

        if report.store_errors > 0 {
            self.release_in_flight().await;
        }
        Ok(report)
    }

    async fn settle(&self, stored: &StoredRecord) -> Result<Outcome, StoreError> {
        let e = match self.resend(stored).await {
            Ok(()) => {
                self.store.complete(stored.id).await?;
                debug!(
                    correlation_id = %stored.record.correlation_id,
                    record_id = stored.id.0,
                    retry_count = stored.record.retry_count,
                    "Redelivered stored payload"
                );
                return Ok(Outcome::Delivered);
            }
            Err(e) => e,
        };

        let message = e.to_string();
        let attempt = stored.record.retry_count.saturating_add(1);
        let delay = self
            .policy
            .delay_after_failure(&stored.record)
            .filter(|_| e.is_transient());

        match delay {
            Some(delay) => {
                let next_at = next_attempt_at(Utc::now(), delay);
                self.store.reschedule(stored.id, next_at, &message).await?;
                warn!(
                    correlation_id = %stored.record.correlation_id,
                    record_id = stored.id.0,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Redelivery failed, rescheduled"
                );
                Ok(Outcome::Rescheduled)
            }
            None => {
                self.store.discard(stored.id, &message).await?;
                error!(
                    correlation_id = %stored.record.correlation_id,
                    record_id = stored.id.0,
                    attempt,
                    error = %message,
                    "Redelivery failed, giving up"
                );
                Ok(Outcome::Discarded)
            }
        }
    }

    async fn release_in_flight(&self) {
        match self.store.recover_orphans().await {
            Ok(n) => info!(released = n, "Returned in-flight retry records to pending"),
            Err(e) => error!(error = %e, "Failed to return in-flight retry records to pending"),
        }
    }

    /// Run passes forever at the configured interval.
    ///
    /// Records left in flight by a previous process are released first.
    pub async fn run(&self) -> ! {
        match self.store.recover_orphans().await {
            Ok(0) => {}
            Ok(n) => info!(recovered = n, "Recovered in-flight retry records"),
            Err(e) => warn!(error = %e, "Failed to recover in-flight retry records"),
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if !report.is_empty() => info!(
                    delivered = report.delivered,
                    rescheduled = report.rescheduled,
                    discarded = report.discarded,
                    store_errors = report.store_errors,
                    "Store-and-forward pass finished"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Store-and-forward pass failed"),
            }
        }
    }

    async fn resend(&self, stored: &StoredRecord) -> Result<(), DeliveryError> {
        let destination = self.transport.destination();
        if stored.record.destination != *destination {
            warn!(
                record_id = stored.id.0,
                stored = %stored.record.destination.url,
                current = %destination.url,
                "Destination changed since the record was stored"
            );
        }

        let send = self
            .transport
            .send(&stored.record.payload, &stored.record.correlation_id);
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(DeliveryError::Timeout {
                url: destination.url.clone(),
                elapsed: self.send_timeout,
            }),
        }
    }
}

fn next_attempt_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
