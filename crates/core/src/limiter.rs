//! Admission control for concurrently processed queries.
//!
//! [`AdmissionController`] is the sole barrier between "arrived" and
//! "running": a counting semaphore of size `max_concurrent` with a bounded
//! wait. Callers that time out in the queue never enter the pipeline and
//! never touch shared resources. Counters are atomic so concurrent
//! acquire/release cannot double-count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::CoreError;

/// Semaphore-backed gate limiting concurrently active requests.
///
/// Created once at startup; the `Arc` is cheaply cloned into handlers.
/// FIFO-ish fairness is inherited from the tokio semaphore's wait queue.
pub struct AdmissionController {
    max_concurrent: usize,
    queue_timeout: Duration,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    active_requests: AtomicU64,
    queued_requests: AtomicU64,
}

/// Timing record for one accepted request.
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub id: String,
    pub queued_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    /// Time spent waiting for a slot.
    pub wait_time: Duration,
}

/// RAII guard for an occupied admission slot.
///
/// The slot is held from acquisition until the guard is dropped (success or
/// failure); the drop releases the semaphore permit and decrements the
/// active counter.
#[derive(Debug)]
pub struct AdmissionPermit {
    ticket: AdmissionTicket,
    started: Instant,
    counters: Arc<Counters>,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    pub fn ticket(&self) -> &AdmissionTicket {
        &self.ticket
    }

    /// Time this request spent queued before starting.
    pub fn wait_time(&self) -> Duration {
        self.ticket.wait_time
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.counters.active_requests.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(
            request_id = %self.ticket.id,
            processing_ms = self.started.elapsed().as_millis() as u64,
            "Request completed",
        );
    }
}

/// Read-only counter snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConcurrencyStatus {
    pub max_concurrent: usize,
    pub active_requests: u64,
    pub queued_requests: u64,
    pub total_requests: u64,
    pub utilization_percent: f64,
}

impl AdmissionController {
    pub fn new(max_concurrent: usize, queue_timeout: Duration) -> Arc<Self> {
        tracing::info!(max_concurrent, "Admission controller initialized");
        Arc::new(Self {
            max_concurrent,
            queue_timeout,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Wait for an admission slot, up to the configured queue timeout.
    ///
    /// Returns a scoped [`AdmissionPermit`] on success. On timeout the
    /// request is cancelled while still queued: `active_requests` is never
    /// incremented and [`CoreError::QueueTimeout`] is returned.
    pub async fn acquire(&self, request_id: impl Into<String>) -> Result<AdmissionPermit, CoreError> {
        let id = request_id.into();
        let queued_at = Utc::now();
        let queued = Instant::now();

        self.counters.total_requests.fetch_add(1, Ordering::SeqCst);
        self.counters.queued_requests.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            request_id = %id,
            active = self.counters.active_requests.load(Ordering::SeqCst),
            max_concurrent = self.max_concurrent,
            "Request queued",
        );

        let acquired = tokio::time::timeout(
            self.queue_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;
        self.counters.queued_requests.fetch_sub(1, Ordering::SeqCst);

        match acquired {
            Ok(Ok(permit)) => {
                self.counters.active_requests.fetch_add(1, Ordering::SeqCst);
                let wait_time = queued.elapsed();
                tracing::info!(
                    request_id = %id,
                    wait_ms = wait_time.as_millis() as u64,
                    active = self.counters.active_requests.load(Ordering::SeqCst),
                    "Request started",
                );
                Ok(AdmissionPermit {
                    ticket: AdmissionTicket {
                        id,
                        queued_at,
                        started_at: Utc::now(),
                        wait_time,
                    },
                    started: Instant::now(),
                    counters: Arc::clone(&self.counters),
                    _permit: permit,
                })
            }
            // The semaphore is never closed while the controller is alive.
            Ok(Err(_)) => Err(CoreError::Internal("admission semaphore closed".into())),
            Err(_) => {
                tracing::warn!(
                    request_id = %id,
                    timeout_secs = self.queue_timeout.as_secs(),
                    "Request timed out in admission queue",
                );
                Err(CoreError::QueueTimeout(self.queue_timeout))
            }
        }
    }

    /// Whether every slot is currently occupied.
    pub fn is_at_capacity(&self) -> bool {
        self.counters.active_requests.load(Ordering::SeqCst) >= self.max_concurrent as u64
    }

    pub fn status(&self) -> ConcurrencyStatus {
        let active = self.counters.active_requests.load(Ordering::SeqCst);
        ConcurrencyStatus {
            max_concurrent: self.max_concurrent,
            active_requests: active,
            queued_requests: self.counters.queued_requests.load(Ordering::SeqCst),
            total_requests: self.counters.total_requests.load(Ordering::SeqCst),
            utilization_percent: active as f64 / self.max_concurrent as f64 * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn acquire_and_release_updates_counters() {
        let limiter = AdmissionController::new(2, Duration::from_secs(1));

        let permit = limiter.acquire("req-1").await.unwrap();
        let status = limiter.status();
        assert_eq!(status.active_requests, 1);
        assert_eq!(status.total_requests, 1);
        assert_eq!(status.queued_requests, 0);
        assert!((status.utilization_percent - 50.0).abs() < f64::EPSILON);

        drop(permit);
        assert_eq!(limiter.status().active_requests, 0);
    }

    #[tokio::test]
    async fn queue_timeout_does_not_count_as_active() {
        let limiter = AdmissionController::new(1, Duration::from_millis(20));

        let _held = limiter.acquire("holder").await.unwrap();
        let err = limiter.acquire("starved").await.unwrap_err();
        assert_matches!(err, CoreError::QueueTimeout(_));

        let status = limiter.status();
        assert_eq!(status.active_requests, 1); // only the holder
        assert_eq!(status.queued_requests, 0);
        assert_eq!(status.total_requests, 2); // both attempts counted
    }

    #[tokio::test]
    async fn slot_freed_by_drop_admits_waiter() {
        let limiter = AdmissionController::new(1, Duration::from_secs(5));

        let held = limiter.acquire("first").await.unwrap();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("second").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.status().queued_requests, 1);

        drop(held);
        let permit = waiter.await.unwrap().unwrap();
        assert!(permit.wait_time() >= Duration::from_millis(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn active_requests_never_exceed_max_concurrent() {
        const MAX: usize = 3;
        let limiter = AdmissionController::new(MAX, Duration::from_secs(10));
        let peak = Arc::new(AtomicU64::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = limiter.acquire(format!("req-{i}")).await.unwrap();
                    let active = limiter.status().active_requests;
                    peak.fetch_max(active, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= MAX as u64);
        let status = limiter.status();
        assert_eq!(status.total_requests, 12);
        assert_eq!(status.active_requests, 0);
    }
}
