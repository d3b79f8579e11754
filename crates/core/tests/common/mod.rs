#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use mailpulse_core::{
    Event, EventBatcher, EventBatcherBuilder, MemoryStore, Result, TelemetryConfig,
    TelemetryError, Transport,
};
use tokio::sync::{mpsc, watch};

/// Records every batch, can be told to fail, and can hold sends open.
pub struct MockTransport {
    calls: Mutex<Vec<Vec<Event>>>,
    failing: AtomicBool,
    gate: watch::Sender<bool>,
    sent: mpsc::UnboundedSender<Vec<Event>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<Event>>) {
        let (sent, rx) = mpsc::unbounded_channel();
        let (gate, _) = watch::channel(true);
        let transport = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gate,
            sent,
        });
        (transport, rx)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sends started after this block until `release`.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<Vec<Event>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, batch: &[Event]) -> Result<()> {
        self.calls.lock().unwrap().push(batch.to_vec());
        let _ = self.sent.send(batch.to_vec());

        let mut open = self.gate.subscribe();
        let _ = open.wait_for(|open| *open).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::Rejected {
                url: "mock://ingest".to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

pub fn batcher(transport: Arc<MockTransport>, store: Arc<MemoryStore>) -> EventBatcher {
    batcher_with(TelemetryConfig::default(), transport, store)
}

pub fn batcher_with(
    cfg: TelemetryConfig,
    transport: Arc<MockTransport>,
    store: Arc<MemoryStore>,
) -> EventBatcher {
    EventBatcherBuilder::new(cfg)
        .transport(transport)
        .store(store)
        .build()
        .unwrap()
}

pub fn names(events: &[Event]) -> Vec<&str> {
    events.iter().map(Event::name).collect()
}
