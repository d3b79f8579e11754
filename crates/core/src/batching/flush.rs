use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::task::{JoinError, JoinHandle};

use crate::{batching::BatcherMetrics, events::Event, storage::FailureStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered(usize),
    /// Transport failed; the batch is in the failure store.
    Persisted(usize),
    /// Transport and failure store both failed.
    Lost(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    NothingToRetry,
    Delivered(usize),
    /// Retry failed; the events are back in the failure store.
    Restored(usize),
    /// Retry failed and the events could not be written back.
    Lost(usize),
    /// The failure store could not be read; it is left untouched.
    Unreadable,
}

/// Shared between a send task and whoever may cancel it. Exactly one side
/// wins `claim` and settles the batch.
#[derive(Default)]
pub(crate) struct SendState {
    claimed: AtomicBool,
    finished: AtomicBool,
}

impl SendState {
    pub(crate) fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Handle to a batch whose transport call is running. Dropping it leaves the
/// send running in the background.
pub struct FlushTask {
    pub(crate) handle: JoinHandle<FlushOutcome>,
    pub(crate) batch: Arc<[Event]>,
    pub(crate) state: Arc<SendState>,
    pub(crate) failures: FailureStore,
    pub(crate) metrics: Arc<BatcherMetrics>,
}

impl FlushTask {
    pub fn batch(&self) -> &[Event] {
        &self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub async fn wait(self) -> FlushOutcome {
        let FlushTask {
            handle,
            batch,
            state,
            failures,
            metrics,
        } = self;
        let joined = handle.await;
        settle(joined, batch, &state, failures, metrics).await
    }

    /// Waits at most `deadline`. A send still running at the deadline is
    /// aborted and its batch persisted for the next startup retry.
    pub async fn wait_with_deadline(self, deadline: Duration) -> FlushOutcome {
        let FlushTask {
            mut handle,
            batch,
            state,
            failures,
            metrics,
        } = self;

        let joined = match tokio::time::timeout(deadline, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    events = batch.len(),
                    deadline_ms = deadline.as_millis() as u64,
                    "flush deadline elapsed, aborting send"
                );
                handle.abort();
                handle.await
            }
        };

        settle(joined, batch, &state, failures, metrics).await
    }
}

async fn settle(
    joined: Result<FlushOutcome, JoinError>,
    batch: Arc<[Event]>,
    state: &SendState,
    failures: FailureStore,
    metrics: Arc<BatcherMetrics>,
) -> FlushOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_panic() {
                tracing::error!(error = %e, "flush task panicked");
            }
            if !state.claim() {
                // Already settled by the shutdown sweep.
                return FlushOutcome::Persisted(batch.len());
            }
            persist_batch(batch, failures, metrics).await
        }
    }
}

pub(crate) async fn persist_batch(
    batch: Arc<[Event]>,
    failures: FailureStore,
    metrics: Arc<BatcherMetrics>,
) -> FlushOutcome {
    let count = batch.len();
    let written = failures.blocking(move |store| store.append(&batch)).await;

    match written {
        Ok(stored) => {
            metrics.record_persisted(count);
            tracing::info!(
                events = count,
                stored,
                key = failures.key(),
                "persisted undelivered batch"
            );
            FlushOutcome::Persisted(count)
        }
        Err(e) => {
            metrics.record_lost(count);
            tracing::error!(
                events = count,
                key = failures.key(),
                error = %e,
                "failed to persist undelivered batch"
            );
            FlushOutcome::Lost(count)
        }
    }
}
