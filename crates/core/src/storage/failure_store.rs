use std::sync::{Arc, Mutex};

use crate::{
    error::{Result, TelemetryError},
    events::Event,
    storage::KeyValueStore,
};

/// Undelivered events kept as one JSON array under a fixed key. Clones
/// share one write lock, so at most one write pass runs at a time.
#[derive(Clone)]
pub struct FailureStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    write_pass: Arc<Mutex<()>>,
}

impl FailureStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            write_pass: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key that unparseable contents are moved to before being replaced.
    pub fn corrupt_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    pub fn load(&self) -> Result<Vec<Event>> {
        match self.store.get(&self.key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Runs `op` on the blocking pool. Store backends do synchronous I/O.
    pub async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FailureStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| TelemetryError::Storage {
                key: self.key.clone(),
                reason: format!("storage task failed: {e}"),
            })?
    }

    /// Merges `batch` after whatever is already stored. Returns the stored
    /// count afterwards.
    ///
    /// A failed read is returned as is and nothing is written. Contents that
    /// read fine but do not parse are moved to [`corrupt_key`](Self::corrupt_key)
    /// first.
    pub fn append(&self, batch: &[Event]) -> Result<usize> {
        let _pass = self.write_pass.lock().expect("FailureStore poisoned");
        let mut stored = match self.store.get(&self.key)? {
            Some(raw) if !raw.trim().is_empty() => match serde_json::from_str(&raw) {
                Ok(stored) => stored,
                Err(e) => {
                    let aside = self.corrupt_key();
                    self.store.set(&aside, &raw)?;
                    tracing::warn!(
                        key = %self.key,
                        moved_to = %aside,
                        error = %e,
                        "failure store did not parse, moved aside"
                    );
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };
        stored.extend_from_slice(batch);
        self.save(&stored)?;
        Ok(stored.len())
    }

    /// Overwrites the stored events.
    pub fn replace(&self, events: &[Event]) -> Result<()> {
        let _pass = self.write_pass.lock().expect("FailureStore poisoned");
        self.save(events)
    }

    /// Drops the first `count` stored events, keeping anything appended
    /// after them.
    pub fn remove_prefix(&self, count: usize) -> Result<()> {
        let _pass = self.write_pass.lock().expect("FailureStore poisoned");
        let mut stored = self.load()?;
        stored.drain(..count.min(stored.len()));
        self.save(&stored)
    }

    pub fn clear(&self) -> Result<()> {
        let _pass = self.write_pass.lock().expect("FailureStore poisoned");
        self.store.remove(&self.key)
    }

    fn save(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return self.store.remove(&self.key);
        }
        let raw = serde_json::to_string(events)?;
        self.store.set(&self.key, &raw)
    }
}
