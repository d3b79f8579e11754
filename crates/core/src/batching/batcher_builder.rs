use std::sync::Arc;

use tokio::runtime::Handle;
use uuid::Uuid;

use crate::{
    batching::{BatcherSettings, EventBatcher},
    config::TelemetryConfig,
    error::{Result, TelemetryError},
    events::{SessionContext, StoredSessionUser, UserResolver},
    storage::{FailureStore, FileStore, KeyValueStore},
    transport::{HttpTransport, Transport},
};

/// Wires an [`EventBatcher`] from config. Anything not supplied falls back
/// to the production pieces: HTTP transport, file store under
/// `storage_dir`, user id from the stored session.
pub struct EventBatcherBuilder {
    cfg: TelemetryConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    user: Option<Arc<dyn UserResolver>>,
    session_id: Option<Uuid>,
    runtime: Option<Handle>,
}

impl EventBatcherBuilder {
    pub fn new(cfg: TelemetryConfig) -> Self {
        Self {
            cfg,
            transport: None,
            store: None,
            user: None,
            session_id: None,
            runtime: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn user_resolver(mut self, user: Arc<dyn UserResolver>) -> Self {
        self.user = Some(user);
        self
    }

    pub fn session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<EventBatcher> {
        self.cfg.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?,
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStore::new(self.cfg.storage_dir.clone())));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(self.cfg.ingest_url.clone())));
        let user = self.user.unwrap_or_else(|| {
            Arc::new(StoredSessionUser::new(
                Arc::clone(&store),
                self.cfg.session_key.clone(),
            ))
        });

        let session = match self.session_id {
            Some(id) => SessionContext::with_session_id(id, user),
            None => SessionContext::new(user),
        };
        let failures = FailureStore::new(store, self.cfg.failure_store_key.clone());

        tracing::debug!(
            session_id = %session.session_id(),
            flush_threshold = self.cfg.flush_threshold,
            flush_delay_ms = self.cfg.flush_delay.as_millis() as u64,
            "event batcher ready"
        );

        Ok(EventBatcher::new(
            BatcherSettings {
                flush_threshold: self.cfg.flush_threshold,
                flush_delay: self.cfg.flush_delay,
                unload_deadline: self.cfg.unload_deadline,
                retry_strategy: self.cfg.retry_strategy,
            },
            session,
            transport,
            failures,
            runtime,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn build_outside_a_runtime_fails() {
        let err = EventBatcherBuilder::new(TelemetryConfig::default())
            .store(Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, TelemetryError::NoRuntime));
    }

    #[test]
    fn invalid_config_is_rejected_before_wiring() {
        let cfg = TelemetryConfig {
            flush_threshold: 0,
            ..TelemetryConfig::default()
        };
        let err = EventBatcherBuilder::new(cfg).build().err().unwrap();
        assert!(matches!(err, TelemetryError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn fixed_session_id_is_used() {
        let id = Uuid::new_v4();
        let batcher = EventBatcherBuilder::new(TelemetryConfig::default())
            .store(Arc::new(MemoryStore::new()))
            .session_id(id)
            .build()
            .unwrap();
        assert_eq!(batcher.session_id(), id);
    }
}
