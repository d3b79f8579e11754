use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct BatcherMetrics {
    events_recorded: AtomicU64,
    batches_sent: AtomicU64,
    events_delivered: AtomicU64,
    batches_failed: AtomicU64,
    events_persisted: AtomicU64,
    events_lost: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_recorded: u64,
    pub batches_sent: u64,
    pub events_delivered: u64,
    pub batches_failed: u64,
    pub events_persisted: u64,
    pub events_lost: u64,
}

impl BatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, events: usize) {
        self.events_delivered.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, events: usize) {
        self.events_persisted.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_lost(&self, events: usize) {
        self.events_lost.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
        }
    }
}
