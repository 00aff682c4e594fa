use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::notifier::{Notifier, OutboundMessage};
use super::router::Destination;
use crate::error::AppError;

struct DispatchJob {
    destination: Destination,
    message: OutboundMessage,
    enqueued_at: Instant,
}

/// One FIFO delivery worker per destination URL.
///
/// Jobs for the same destination are sent in enqueue order; destinations
/// never wait on each other. Enqueue never blocks: a full queue drops the
/// alert with a warning.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    queue_depth: usize,
    workers: Mutex<HashMap<String, mpsc::Sender<DispatchJob>>>,
}

/// Single delivery attempt bounded by `timeout`. No retry.
pub async fn send_with_timeout(
    notifier: &dyn Notifier,
    destination: &Destination,
    message: &OutboundMessage,
    timeout: Duration,
) -> Result<(), AppError> {
    match tokio::time::timeout(timeout, notifier.send(destination, message)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::DispatchTimeout(timeout.as_millis() as u64)),
    }
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration, queue_depth: usize) -> Self {
        Self {
            notifier,
            timeout,
            queue_depth: queue_depth.max(1),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver immediately on the caller's task, bypassing the queues.
    pub async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), AppError> {
        send_with_timeout(self.notifier.as_ref(), destination, message, self.timeout).await
    }

    /// Queue a delivery on the destination's worker, spawning it on first
    /// use. Must be called from within a tokio runtime. Returns `false` when
    /// the alert was dropped.
    pub fn enqueue(&self, destination: Destination, message: OutboundMessage) -> bool {
        let mut job = DispatchJob {
            destination,
            message,
            enqueued_at: Instant::now(),
        };
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        // At most two passes: the second only after replacing a dead worker.
        for _ in 0..2 {
            let worker_key = job.destination.url.clone();
            let tx = workers
                .entry(worker_key.clone())
                .or_insert_with(|| self.spawn_worker())
                .clone();
            match tx.try_send(job) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Full(rejected)) => {
                    tracing::warn!(
                        destination = %rejected.destination.key,
                        tag = ?rejected.message.tag,
                        "Dispatch queue full, alert dropped"
                    );
                    return false;
                }
                Err(mpsc::error::TrySendError::Closed(rejected)) => {
                    workers.remove(&worker_key);
                    job = rejected;
                }
            }
        }

        tracing::error!(
            destination = %job.destination.key,
            "Dispatch worker unavailable, alert dropped"
        );
        false
    }

    fn spawn_worker(&self) -> mpsc::Sender<DispatchJob> {
        let (tx, mut rx) = mpsc::channel::<DispatchJob>(self.queue_depth);
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let queued_ms = job.enqueued_at.elapsed().as_millis() as u64;
                match send_with_timeout(notifier.as_ref(), &job.destination, &job.message, timeout)
                    .await
                {
                    Ok(()) => tracing::info!(
                        destination = %job.destination.key,
                        tag = ?job.message.tag,
                        queued_ms,
                        "Alert delivered"
                    ),
                    Err(e) => tracing::error!(
                        destination = %job.destination.key,
                        tag = ?job.message.tag,
                        error = %e,
                        "Alert delivery failed, not retried"
                    ),
                }
            }
        });
        tx
    }

    /// Number of live destination workers.
    pub fn worker_count(&self) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.len()
    }
}
