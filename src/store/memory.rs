//! In-memory baseline store, for tests and dry runs.

use super::{Baseline, BaselineStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Volatile store with the same CAS semantics as the durable ones.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Baseline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Baseline>, StoreError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn save(
        &self,
        key: &str,
        baseline: &Baseline,
        expected_sequence: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let found = entries.get(key).map(|b| b.sequence);
        if found != expected_sequence {
            return Err(StoreError::Conflict {
                expected: expected_sequence,
                found,
            });
        }
        entries.insert(key.to_string(), baseline.clone());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}
