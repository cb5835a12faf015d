//! Reconciler — drives one observe → load → compare → notify/advance
//! cycle.
//!
//! Exactly one cycle runs per invocation; scheduling is external. The
//! core correctness property is idempotence: with no real-world change,
//! back-to-back cycles land in `NoChange` and send nothing.

use crate::config::NotifyFailurePolicy;
use crate::detect::{detect, ChangeResult, DetectError, DetectOptions};
use crate::notify::{build_notification, Notifier, NotifyError};
use crate::source::{ObservationError, ObservationSource};
use crate::store::{Baseline, BaselineStore, StoreError};
use thiserror::Error;

/// Per-cycle settings, derived from the watch configuration.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Logical baseline key.
    pub key: String,
    pub detect: DetectOptions,
    pub on_notify_failure: NotifyFailurePolicy,
}

/// Terminal state of a successful cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No prior baseline existed; the current observation was persisted
    /// silently as the first trusted reference point.
    Bootstrapped,
    /// Nothing changed; nothing was persisted or sent.
    NoChange,
    /// A change was notified and the baseline advanced.
    Notified(ChangeResult),
    /// Notification failed but policy advanced the baseline anyway
    /// (at-most-once delivery).
    AdvancedUnnotified(ChangeResult),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Bootstrapped => "bootstrapped",
            CycleOutcome::NoChange => "no-change",
            CycleOutcome::Notified(_) => "notified",
            CycleOutcome::AdvancedUnnotified(_) => "advanced-unnotified",
        }
    }

    pub fn change(&self) -> Option<&ChangeResult> {
        match self {
            CycleOutcome::Notified(r) | CycleOutcome::AdvancedUnnotified(r) => Some(r),
            _ => None,
        }
    }
}

/// Cycle failure. Each variant maps to exactly one terminal state; no
/// error is silently discarded.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Observation failed; the baseline was never touched.
    #[error("observation failed: {0}")]
    Observe(#[from] ObservationError),
    #[error("baseline load failed: {0}")]
    Load(StoreError),
    #[error("comparison failed: {0}")]
    Detect(#[from] DetectError),
    /// Notification failed under the abort policy; the baseline was not
    /// advanced, so the change will be re-detected next cycle.
    #[error("notification failed, baseline not advanced: {0}")]
    Notify(#[from] NotifyError),
    #[error("baseline save failed: {0}")]
    Save(StoreError),
    /// The change was reported but the baseline did not advance. The
    /// next cycle may send a duplicate notification.
    #[error("change notified but baseline save failed: {0}")]
    BaselineLagged(StoreError),
}

/// One-shot reconciler over the three capability seams.
pub struct Reconciler {
    source: Box<dyn ObservationSource>,
    store: Box<dyn BaselineStore>,
    notifier: Box<dyn Notifier>,
    settings: CycleSettings,
}

impl Reconciler {
    pub fn new(
        source: Box<dyn ObservationSource>,
        store: Box<dyn BaselineStore>,
        notifier: Box<dyn Notifier>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            settings,
        }
    }

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let target = self.source.describe();
        tracing::info!(target = %target, key = %self.settings.key, "cycle start");

        let current = self.source.observe().await?;
        tracing::debug!(kind = %current.kind(), "observed {}", current.summary());

        let baseline = self
            .store
            .load(&self.settings.key)
            .await
            .map_err(CycleError::Load)?;

        let result = detect(
            baseline.as_ref().map(|b| &b.observation),
            &current,
            &self.settings.detect,
        )?;

        let Some(previous) = baseline else {
            let first = Baseline::first(current);
            self.store
                .save(&self.settings.key, &first, None)
                .await
                .map_err(CycleError::Save)?;
            tracing::info!("baseline established: {}", first.observation.summary());
            return Ok(CycleOutcome::Bootstrapped);
        };

        if !result.changed {
            tracing::info!("no change; baseline untouched");
            return Ok(CycleOutcome::NoChange);
        }

        tracing::info!("change detected: {}", result.summary());

        // Notify first: persisting before a successful notify would lose
        // the record of what changed if delivery has to be retried.
        let record = build_notification(&target, &result);
        match self.notifier.send(&record).await {
            Ok(()) => {
                let next = previous.next(current);
                match self
                    .store
                    .save(&self.settings.key, &next, Some(previous.sequence))
                    .await
                {
                    Ok(()) => Ok(CycleOutcome::Notified(result)),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "change was notified but the baseline did not advance; \
                             the next cycle may re-notify"
                        );
                        Err(CycleError::BaselineLagged(e))
                    }
                }
            }
            Err(e) => match self.settings.on_notify_failure {
                NotifyFailurePolicy::Abort => Err(CycleError::Notify(e)),
                NotifyFailurePolicy::Advance => {
                    tracing::warn!(error = %e, "notification failed; advancing baseline anyway");
                    let next = previous.next(current);
                    self.store
                        .save(&self.settings.key, &next, Some(previous.sequence))
                        .await
                        .map_err(CycleError::Save)?;
                    Ok(CycleOutcome::AdvancedUnnotified(result))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationRecord;
    use crate::observation::{Observation, TextLines};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Source that yields a fixed observation, or fails.
    struct ScriptedSource {
        result: Mutex<Option<Result<Observation, ObservationError>>>,
    }

    impl ScriptedSource {
        fn ok(obs: Observation) -> Box<Self> {
            Box::new(Self {
                result: Mutex::new(Some(Ok(obs))),
            })
        }

        fn timeout() -> Box<Self> {
            Box::new(Self {
                result: Mutex::new(Some(Err(ObservationError::Timeout(5_000)))),
            })
        }
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn observe(&self) -> Result<Observation, ObservationError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("observe called more than once")
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Notifier that records every delivery, optionally failing them.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<NotificationRecord>>,
        failures: AtomicUsize,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(usize::MAX),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(NotifyError::Transport("scripted failure".to_string()));
            }
            self.sent.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    /// Store whose saves always fail, wrapping a working one for loads.
    struct SaveFailingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl BaselineStore for SaveFailingStore {
        async fn load(&self, key: &str) -> Result<Option<Baseline>, StoreError> {
            self.inner.load(key).await
        }

        async fn save(
            &self,
            _key: &str,
            _baseline: &Baseline,
            _expected_sequence: Option<u64>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Transport("disk full".to_string()))
        }

        async fn clear(&self, key: &str) -> Result<(), StoreError> {
            self.inner.clear(key).await
        }
    }

    fn text(lines: &[&str]) -> Observation {
        Observation::Text(TextLines::new(lines.iter().copied()))
    }

    fn settings(policy: NotifyFailurePolicy) -> CycleSettings {
        CycleSettings {
            key: "k".to_string(),
            detect: DetectOptions::default(),
            on_notify_failure: policy,
        }
    }

    fn reconciler(
        source: Box<dyn ObservationSource>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        policy: NotifyFailurePolicy,
    ) -> Reconciler {
        Reconciler::new(
            source,
            Box::new(SharedStore(store)),
            Box::new(SharedNotifier(notifier)),
            settings(policy),
        )
    }

    struct SharedStore(Arc<MemoryStore>);

    #[async_trait]
    impl BaselineStore for SharedStore {
        async fn load(&self, key: &str) -> Result<Option<Baseline>, StoreError> {
            self.0.load(key).await
        }

        async fn save(
            &self,
            key: &str,
            baseline: &Baseline,
            expected_sequence: Option<u64>,
        ) -> Result<(), StoreError> {
            self.0.save(key, baseline, expected_sequence).await
        }

        async fn clear(&self, key: &str) -> Result<(), StoreError> {
            self.0.clear(key).await
        }
    }

    struct SharedNotifier(Arc<RecordingNotifier>);

    #[async_trait]
    impl Notifier for SharedNotifier {
        async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
            self.0.send(record).await
        }
    }

    #[tokio::test]
    async fn test_bootstrap_persists_without_notifying() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let r = reconciler(
            ScriptedSource::ok(text(&["A", "B"])),
            Arc::clone(&store),
            Arc::clone(&notifier),
            NotifyFailurePolicy::Abort,
        );

        let outcome = r.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Bootstrapped));
        assert_eq!(notifier.sent_count(), 0);

        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 1);
        assert_eq!(baseline.observation, text(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_unchanged_source_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        for _ in 0..2 {
            let r = reconciler(
                ScriptedSource::ok(text(&["A", "B"])),
                Arc::clone(&store),
                Arc::clone(&notifier),
                NotifyFailurePolicy::Abort,
            );
            r.run_cycle().await.unwrap();
        }

        // Second cycle must be a pure no-op: same baseline, zero sends.
        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 1);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_change_notifies_then_advances() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store
            .save("k", &Baseline::first(text(&["A", "B"])), None)
            .await
            .unwrap();

        let r = reconciler(
            ScriptedSource::ok(text(&["A", "B", "C"])),
            Arc::clone(&store),
            Arc::clone(&notifier),
            NotifyFailurePolicy::Abort,
        );
        let outcome = r.run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Notified(_)));
        assert_eq!(notifier.sent_count(), 1);
        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 2);
        assert_eq!(baseline.observation, text(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_observation_failure_preserves_baseline() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store
            .save("k", &Baseline::first(text(&["A"])), None)
            .await
            .unwrap();

        let r = reconciler(
            ScriptedSource::timeout(),
            Arc::clone(&store),
            Arc::clone(&notifier),
            NotifyFailurePolicy::Abort,
        );
        let err = r.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::Observe(ObservationError::Timeout(_))));
        assert_eq!(notifier.sent_count(), 0);
        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 1);
        assert_eq!(baseline.observation, text(&["A"]));
    }

    #[tokio::test]
    async fn test_notify_failure_abort_policy_keeps_baseline() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::failing());
        store
            .save("k", &Baseline::first(text(&["A"])), None)
            .await
            .unwrap();

        let r = reconciler(
            ScriptedSource::ok(text(&["A", "B"])),
            Arc::clone(&store),
            Arc::clone(&notifier),
            NotifyFailurePolicy::Abort,
        );
        let err = r.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::Notify(_)));
        // Change will be re-detected and re-notified next cycle.
        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 1);
        assert_eq!(baseline.observation, text(&["A"]));
    }

    #[tokio::test]
    async fn test_notify_failure_advance_policy_moves_on() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::failing());
        store
            .save("k", &Baseline::first(text(&["A"])), None)
            .await
            .unwrap();

        let r = reconciler(
            ScriptedSource::ok(text(&["A", "B"])),
            Arc::clone(&store),
            Arc::clone(&notifier),
            NotifyFailurePolicy::Advance,
        );
        let outcome = r.run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::AdvancedUnnotified(_)));
        let baseline = store.load("k").await.unwrap().unwrap();
        assert_eq!(baseline.sequence, 2);
    }

    #[tokio::test]
    async fn test_save_failure_after_notify_is_distinct() {
        let inner = MemoryStore::new();
        inner
            .save("k", &Baseline::first(text(&["A"])), None)
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());

        let r = Reconciler::new(
            ScriptedSource::ok(text(&["A", "B"])),
            Box::new(SaveFailingStore { inner }),
            Box::new(SharedNotifier(Arc::clone(&notifier))),
            settings(NotifyFailurePolicy::Abort),
        );
        let err = r.run_cycle().await.unwrap_err();

        // The notification went out but the baseline lagged behind.
        assert!(matches!(err, CycleError::BaselineLagged(_)));
        assert_eq!(notifier.sent_count(), 1);
    }
}
