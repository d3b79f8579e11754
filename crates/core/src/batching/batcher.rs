use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::Notify,
    task::{AbortHandle, JoinHandle},
};
use uuid::Uuid;

use crate::{
    batching::{
        BatcherMetrics, FlushOutcome, FlushTask, MetricsSnapshot, RetryOutcome,
        flush::{SendState, persist_batch},
    },
    config::RetryStrategy,
    events::{Attributes, Event, SessionContext},
    queues::BatchQueue,
    storage::FailureStore,
    transport::Transport,
};

/// Buffers events and ships them in batches. Cheap to clone; every clone
/// feeds the same queue.
#[derive(Clone)]
pub struct EventBatcher {
    inner: Arc<BatcherInner>,
}

pub(crate) struct BatcherSettings {
    pub flush_threshold: usize,
    pub flush_delay: Duration,
    pub unload_deadline: Duration,
    pub retry_strategy: RetryStrategy,
}

struct BatcherInner {
    settings: BatcherSettings,
    session: SessionContext,
    queue: BatchQueue<Event>,
    timer: Mutex<Option<ArmedTimer>>,
    next_timer_epoch: AtomicU64,
    transport: Arc<dyn Transport>,
    failures: FailureStore,
    runtime: Handle,
    sends: Arc<SendRegistry>,
    metrics: Arc<BatcherMetrics>,
}

struct ArmedTimer {
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Transport calls still running, keyed by send id.
#[derive(Default)]
struct SendRegistry {
    next_id: AtomicU64,
    sends: Mutex<HashMap<u64, InFlightSend>>,
    idle: Notify,
}

struct InFlightSend {
    abort: AbortHandle,
    batch: Arc<[Event]>,
    state: Arc<SendState>,
}

impl SendRegistry {
    fn len(&self) -> usize {
        self.sends.lock().expect("send registry poisoned").len()
    }

    /// Removes every entry, oldest send first.
    fn drain(&self) -> Vec<InFlightSend> {
        let mut drained: Vec<_> = self
            .sends
            .lock()
            .expect("send registry poisoned")
            .drain()
            .collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained.into_iter().map(|(_, send)| send).collect()
    }
}

/// Owned by the send task; unregisters the send however the task ends.
struct SendGuard {
    registry: Arc<SendRegistry>,
    id: u64,
    state: Arc<SendState>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.state.mark_finished();
        let Ok(mut sends) = self.registry.sends.lock() else {
            return;
        };
        sends.remove(&self.id);
        let idle = sends.is_empty();
        drop(sends);
        if idle {
            self.registry.idle.notify_waiters();
        }
    }
}

impl EventBatcher {
    pub(crate) fn new(
        settings: BatcherSettings,
        session: SessionContext,
        transport: Arc<dyn Transport>,
        failures: FailureStore,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                settings,
                session,
                queue: BatchQueue::new(),
                timer: Mutex::new(None),
                next_timer_epoch: AtomicU64::new(0),
                transport,
                failures,
                runtime,
                sends: Arc::new(SendRegistry::default()),
                metrics: Arc::new(BatcherMetrics::new()),
            }),
        }
    }

    /// Queues one event. Flushes at the size threshold, otherwise makes sure
    /// a delayed flush is armed. Never fails toward the caller.
    pub fn record(&self, name: impl Into<String>, attributes: Attributes) {
        let event = self.inner.session.stamp(name, attributes);
        self.inner.metrics.record_event();

        let queued = self.inner.queue.push(event);
        if queued >= self.inner.settings.flush_threshold {
            // Detached: the send finishes (or persists) on its own.
            let _ = self.flush();
            return;
        }

        self.arm_timer();
    }

    /// Detaches everything queued and starts sending it. Events recorded
    /// after this call go to the next batch. `None` when nothing was queued.
    pub fn flush(&self) -> Option<FlushTask> {
        self.cancel_timer();

        let batch = self.inner.queue.detach();
        if batch.is_empty() {
            return None;
        }

        Some(self.spawn_send(batch))
    }

    /// Re-sends events stranded by an earlier run. Call once at startup.
    pub async fn retry_failed_events(&self) -> RetryOutcome {
        let failures = &self.inner.failures;
        let strategy = self.inner.settings.retry_strategy;

        let events = match failures.blocking(|store| store.load()).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(key = failures.key(), error = %e, "failure store is unreadable");
                return RetryOutcome::Unreadable;
            }
        };
        if events.is_empty() {
            return RetryOutcome::NothingToRetry;
        }

        let count = events.len();
        if strategy == RetryStrategy::ClearBeforeSend
            && let Err(e) = failures.blocking(|store| store.clear()).await
        {
            tracing::error!(key = failures.key(), error = %e, "failed to clear failure store");
        }

        self.inner.metrics.record_batch_sent();
        let sent = self.inner.transport.send(&events).await;
        match sent {
            Ok(()) => {
                if strategy == RetryStrategy::ClearAfterDelivery {
                    let removed = failures.blocking(move |store| store.remove_prefix(count));
                    if let Err(e) = removed.await {
                        tracing::error!(
                            key = failures.key(),
                            error = %e,
                            "retried events delivered but could not be removed from store"
                        );
                    }
                }
                self.inner.metrics.record_delivered(count);
                tracing::info!(events = count, "delivered events from previous session");
                RetryOutcome::Delivered(count)
            }
            Err(e) => {
                self.inner.metrics.record_batch_failed();
                tracing::warn!(events = count, error = %e, "retry of stored events failed");

                if strategy == RetryStrategy::ClearAfterDelivery {
                    return RetryOutcome::Restored(count);
                }
                match failures.blocking(move |store| store.replace(&events)).await {
                    Ok(()) => RetryOutcome::Restored(count),
                    Err(e) => {
                        self.inner.metrics.record_lost(count);
                        tracing::error!(
                            events = count,
                            key = failures.key(),
                            error = %e,
                            "failed to restore events after retry failure"
                        );
                        RetryOutcome::Lost(count)
                    }
                }
            }
        }
    }

    /// Final flush on exit within the configured unload deadline.
    pub async fn shutdown(&self) -> Option<FlushOutcome> {
        self.shutdown_within(self.inner.settings.unload_deadline).await
    }

    /// Flushes and waits at most `deadline` for this and any earlier sends.
    /// Every send cut off by the deadline is aborted and its batch persisted.
    pub async fn shutdown_within(&self, deadline: Duration) -> Option<FlushOutcome> {
        let started = tokio::time::Instant::now();

        let outcome = match self.flush() {
            Some(task) => Some(task.wait_with_deadline(deadline).await),
            None => None,
        };

        let remaining = deadline.saturating_sub(started.elapsed());
        if tokio::time::timeout(remaining, self.wait_idle()).await.is_err() {
            self.persist_stranded_sends().await;
        }

        outcome
    }

    /// Resolves once no transport call is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.sends.idle.notified();
            if self.inner.sends.len() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session.session_id()
    }

    /// Events queued and not yet detached into a batch.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.sends.len()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.inner
            .timer
            .lock()
            .expect("flush timer poisoned")
            .is_some()
    }

    pub fn failure_store(&self) -> &FailureStore {
        &self.inner.failures
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn arm_timer(&self) {
        let mut slot = self.inner.timer.lock().expect("flush timer poisoned");
        if slot.is_some() {
            return;
        }

        let epoch = self.inner.next_timer_epoch.fetch_add(1, Ordering::Relaxed);
        let delay = self.inner.settings.flush_delay;
        let weak: Weak<BatcherInner> = Arc::downgrade(&self.inner);

        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                EventBatcher { inner }.fire_timer(epoch);
            }
        });

        *slot = Some(ArmedTimer { epoch, handle });
    }

    fn fire_timer(&self, epoch: u64) {
        {
            let mut slot = self.inner.timer.lock().expect("flush timer poisoned");
            match slot.as_ref() {
                Some(armed) if armed.epoch == epoch => {
                    // Ours: release the slot without aborting the running task.
                    slot.take();
                }
                _ => return,
            }
        }

        tracing::debug!(events = self.pending(), "flush delay elapsed");
        let _ = self.flush();
    }

    fn cancel_timer(&self) {
        let armed = self
            .inner
            .timer
            .lock()
            .expect("flush timer poisoned")
            .take();
        if let Some(armed) = armed {
            armed.handle.abort();
        }
    }

    async fn persist_stranded_sends(&self) {
        let stranded = self.inner.sends.drain();
        tracing::warn!(
            sends = stranded.len(),
            "earlier sends still running at shutdown, persisting them"
        );

        for send in stranded {
            send.abort.abort();
            if send.state.claim() {
                persist_batch(
                    send.batch,
                    self.inner.failures.clone(),
                    Arc::clone(&self.inner.metrics),
                )
                .await;
            }
        }
    }

    fn spawn_send(&self, batch: Vec<Event>) -> FlushTask {
        let batch: Arc<[Event]> = batch.into();
        let state = Arc::new(SendState::default());
        let registry = &self.inner.sends;
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = SendGuard {
            registry: Arc::clone(registry),
            id,
            state: Arc::clone(&state),
        };
        let inner = Arc::clone(&self.inner);
        let task_batch = Arc::clone(&batch);
        let task_state = Arc::clone(&state);

        tracing::debug!(events = batch.len(), "flushing batch");

        let handle = self.inner.runtime.spawn(async move {
            let _guard = guard;
            inner.deliver(task_batch, &task_state).await
        });

        {
            let mut sends = registry.sends.lock().expect("send registry poisoned");
            // A send that already finished has unregistered itself.
            if !state.is_finished() {
                sends.insert(
                    id,
                    InFlightSend {
                        abort: handle.abort_handle(),
                        batch: Arc::clone(&batch),
                        state: Arc::clone(&state),
                    },
                );
            }
        }

        FlushTask {
            handle,
            batch,
            state,
            failures: self.inner.failures.clone(),
            metrics: Arc::clone(&self.inner.metrics),
        }
    }
}

impl BatcherInner {
    async fn deliver(&self, batch: Arc<[Event]>, state: &SendState) -> FlushOutcome {
        self.metrics.record_batch_sent();

        let sent = self.transport.send(&batch).await;
        if !state.claim() {
            // Settled by the shutdown sweep.
            return FlushOutcome::Persisted(batch.len());
        }

        match sent {
            Ok(()) => {
                self.metrics.record_delivered(batch.len());
                tracing::debug!(events = batch.len(), "batch delivered");
                FlushOutcome::Delivered(batch.len())
            }
            Err(e) => {
                self.metrics.record_batch_failed();
                tracing::warn!(events = batch.len(), error = %e, "batch delivery failed");
                persist_batch(batch, self.failures.clone(), Arc::clone(&self.metrics)).await
            }
        }
    }
}

impl Drop for BatcherInner {
    fn drop(&mut self) {
        if let Some(armed) = self.timer.get_mut().ok().and_then(Option::take) {
            armed.handle.abort();
        }
    }
}
