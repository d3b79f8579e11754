//! mailpulse core library
//!
//! Client-side telemetry for the mailpulse dashboard: batches events and
//! ships them to the ingestion endpoint, keeps undelivered batches on disk
//! for the next start, and manages auto-dismiss timers for notifications.

pub mod batching;
pub mod config;
pub mod error;
pub mod events;
pub mod notifications;
pub mod queues;
pub mod storage;
pub mod transport;

pub use batching::{
    EventBatcher, EventBatcherBuilder, FlushOutcome, FlushTask, MetricsSnapshot, RetryOutcome,
};
pub use config::{RetryStrategy, TelemetryConfig};
pub use error::{Result, TelemetryError};
pub use events::{ANONYMOUS_USER, AttributeValue, Attributes, Event};
pub use notifications::{Notification, NotificationCenter, NotificationChange, NotificationKind};
pub use storage::{FailureStore, FileStore, KeyValueStore, MemoryStore};
pub use transport::{HttpTransport, Transport};
