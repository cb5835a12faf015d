//! Observation sources — capabilities that sample the watched page.
//!
//! The reconciler never talks to a browser or an HTTP client directly;
//! it sees only `observe()`. A failed observation aborts the cycle
//! before any comparison happens.

pub mod browser;
pub mod page;

use crate::observation::Observation;
use async_trait::async_trait;
use thiserror::Error;

/// Observation failure. Always recoverable: the cycle aborts with the
/// baseline untouched and the next scheduled cycle retries.
#[derive(Debug, Error)]
pub enum ObservationError {
    #[error("observation timed out after {0}ms")]
    Timeout(u64),
    #[error("expected structure not found: {0}")]
    StructureNotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A capability that yields the current observation of the watched page.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self) -> Result<Observation, ObservationError>;

    /// Human-readable description of the watched target, for logs and
    /// notification subjects.
    fn describe(&self) -> String;
}
