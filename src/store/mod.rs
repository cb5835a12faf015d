//! Baseline stores — durable holders of the last accepted observation.
//!
//! The store owns the baseline; the reconciler only holds a transient
//! read copy per cycle. Saves carry an expected sequence so a stale
//! cycle gets a conflict instead of silently clobbering a newer
//! baseline. How strictly the check holds depends on the backend:
//! [`memory::MemoryStore`] enforces it under a lock, while
//! [`file::FileStore`] checks then writes without cross-process
//! exclusion and relies on the deployment assumption of at most one
//! scheduled cycle per key.

pub mod file;
pub mod memory;

use crate::observation::Observation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The last accepted observation plus bookkeeping.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub observation: Observation,
    /// Monotonically increasing per key; drives the save CAS.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Baseline {
    /// The bootstrap baseline for a key that had none.
    pub fn first(observation: Observation) -> Self {
        Self {
            observation,
            sequence: 1,
            captured_at: Utc::now(),
        }
    }

    /// The successor baseline after a processed change.
    pub fn next(&self, observation: Observation) -> Self {
        Self {
            observation,
            sequence: self.sequence + 1,
            captured_at: Utc::now(),
        }
    }
}

/// Store failure. A missing baseline is not an error — `load` maps it to
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected credentials: {0}")]
    Auth(String),
    #[error("store transport failure: {0}")]
    Transport(String),
    /// The stored sequence was not what the caller expected; another
    /// cycle advanced the baseline underneath this one.
    #[error("baseline sequence moved (expected {expected:?}, found {found:?})")]
    Conflict {
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("stored baseline is corrupt: {0}")]
    Corrupt(String),
}

/// Durable holder of the baseline, addressable by a logical key.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Load the baseline for a key. Absence is a valid outcome.
    async fn load(&self, key: &str) -> Result<Option<Baseline>, StoreError>;

    /// Save a baseline, conditional on the currently stored sequence.
    ///
    /// `expected_sequence: None` means "create only" (bootstrap must not
    /// overwrite anything); `Some(n)` means "replace only if the stored
    /// sequence is still n". A mismatch is [`StoreError::Conflict`].
    async fn save(
        &self,
        key: &str,
        baseline: &Baseline,
        expected_sequence: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Administrative delete. Clearing an absent baseline is a no-op.
    async fn clear(&self, key: &str) -> Result<(), StoreError>;
}
