//! Batches compatible requests for the execution loop.
//!
//! A bounded FIFO queue feeds one background scheduler task. Producers
//! submit from any task; the loop wakes on a `Notify` or after
//! `max_batch_wait_ms`, whichever comes first, skims cancelled requests from
//! the head, then pulls everything compatible with the first remaining
//! request up to `max_batch_size`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::config::SchedulerConfig;
use crate::error::{EngineError, EngineResult, StopReason};
use crate::inference::request::InferenceRequest;

/// A group of requests the execution loop can run together. Under
/// `deterministic` replay, prompt handling uses only the first request's
/// prompt tokens as the batch's representative — the scheduler does not
/// attempt per-request prompt divergence within one deterministic batch;
/// this is documented scheduler policy, not an oversight.
pub struct Batch {
    pub requests: Vec<InferenceRequest>,
}

impl Batch {
    pub fn representative_prompt_tokens(&self) -> &[u32] {
        self.requests
            .first()
            .map(|r| r.prompt_tokens.as_slice())
            .unwrap_or(&[])
    }
}

struct Shared {
    queue: Mutex<VecDeque<InferenceRequest>>,
    notify: Notify,
    total_queued: std::sync::atomic::AtomicUsize,
}

pub struct SchedulerHandle {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl SchedulerHandle {
    /// Submits `request` to the pending queue. Fails with
    /// *ResourceExhausted* if `max_total_queued` would be exceeded.
    pub fn submit(&self, request: InferenceRequest) -> EngineResult<()> {
        let current = self.shared.total_queued.load(std::sync::atomic::Ordering::SeqCst);
        if current >= self.config.max_total_queued {
            return Err(EngineError::ResourceExhausted {
                resource: "scheduler_queue".to_string(),
                max: self.config.max_total_queued,
                current,
            });
        }
        self.shared.queue.lock().push_back(request);
        self.shared.total_queued.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Signals the scheduler loop to stop accepting new batches and drain
    /// whatever remains, resolving every drained request with an error.
    /// Waits up to 5 seconds for the loop to finish draining.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        self.shared.notify.notify_one();
        let _ = tokio::time::timeout(Duration::from_secs(5), async {
            while self.shared.total_queued.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }
}

/// Spawns the scheduler's background loop, returning a handle producers use
/// to submit requests and a receiver the execution loop polls for ready
/// batches.
pub fn spawn_scheduler(config: SchedulerConfig) -> (SchedulerHandle, mpsc::UnboundedReceiver<Batch>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        total_queued: std::sync::atomic::AtomicUsize::new(0),
    });
    let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::unbounded_channel();

    let loop_shared = shared.clone();
    let loop_shutdown = shutdown.clone();
    let loop_config = config;
    tokio::spawn(async move {
        scheduler_loop(loop_shared, loop_shutdown, loop_config, ready_tx).await;
    });

    (
        SchedulerHandle { shared, config, shutdown },
        ready_rx,
    )
}

async fn scheduler_loop(
    shared: Arc<Shared>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    config: SchedulerConfig,
    ready_tx: mpsc::UnboundedSender<Batch>,
) {
    let wait = Duration::from_millis(config.max_batch_wait_ms.max(1));
    loop {
        let _ = tokio::time::timeout(wait, shared.notify.notified()).await;

        if shutdown.load(std::sync::atomic::Ordering::SeqCst) {
            drain_with_error(&shared);
            break;
        }

        skim_cancelled(&shared);

        let batch = pull_batch(&shared, config.max_batch_size);
        if !batch.requests.is_empty() {
            let drained = batch.requests.len();
            shared
                .total_queued
                .fetch_sub(drained, std::sync::atomic::Ordering::SeqCst);
            if ready_tx.send(batch).is_err() {
                break; // consumer dropped; nothing left to do
            }
        }
    }
}

fn skim_cancelled(shared: &Shared) {
    let mut queue = shared.queue.lock();
    let before = queue.len();
    queue.retain_mut(|r| {
        if r.cancellation.is_cancelled() {
            if let Some(completion) = r.completion.take() {
                let _ = completion.send(Ok(StopReason::CancelledByCaller));
            }
            false
        } else {
            true
        }
    });
    let removed = before - queue.len();
    if removed > 0 {
        shared
            .total_queued
            .fetch_sub(removed, std::sync::atomic::Ordering::SeqCst);
    }
}

fn pull_batch(shared: &Shared, max_batch_size: usize) -> Batch {
    let mut queue = shared.queue.lock();
    let mut requests = Vec::new();
    while let Some(front) = queue.front() {
        if requests.len() >= max_batch_size {
            break;
        }
        let compatible = requests
            .first()
            .map(|first: &InferenceRequest| first.is_batch_compatible_with(front))
            .unwrap_or(true);
        if !compatible {
            break;
        }
        requests.push(queue.pop_front().unwrap());
    }
    Batch { requests }
}

fn drain_with_error(shared: &Shared) {
    let mut queue = shared.queue.lock();
    while let Some(request) = queue.pop_front() {
        if let Some(completion) = request.completion {
            let _ = completion.send(Ok(StopReason::Error {
                kind: "shutdown".to_string(),
                message: "scheduler shutdown".to_string(),
            }));
        }
    }
    shared.total_queued.store(0, std::sync::atomic::Ordering::SeqCst);
}
