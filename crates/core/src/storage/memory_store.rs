use std::{collections::HashMap, sync::Mutex};

use crate::{
    error::{Result, TelemetryError},
    storage::KeyValueStore,
};

/// In-process store with an optional byte quota, mirroring browser storage
/// that rejects writes once full.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("MemoryStore poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("MemoryStore poisoned");

        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(TelemetryError::Storage {
                    key: key.to_string(),
                    reason: format!("quota of {quota} bytes exceeded"),
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("MemoryStore poisoned")
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn quota_rejects_oversized_writes_and_keeps_old_value() {
        let store = MemoryStore::with_quota(8);
        store.set("k", "short").unwrap();

        let err = store.set("k", "much too long").unwrap_err();
        assert!(matches!(err, TelemetryError::Storage { .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("short"));
    }
}
