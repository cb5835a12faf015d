//! File-backed baseline store.
//!
//! One directory per key under the store root: `meta.json` carries kind,
//! sequence, and timestamp; the payload sits next to it as a blob
//! (`frame.png`, `lines.txt`, or `labels.txt`). Writes go to a temp file
//! first and land with an atomic rename.
//!
//! The sequence check is read-then-write without a cross-process lock:
//! it catches a cycle working from a stale read, but two processes
//! saving the same key at once can still race. The deployment
//! assumption is at most one scheduled cycle per key.

use super::{Baseline, BaselineStore, StoreError};
use crate::observation::{Observation, ObservationKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Baseline store rooted at a local directory.
pub struct FileStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct BaselineMeta {
    kind: ObservationKind,
    sequence: u64,
    captured_at: DateTime<Utc>,
    payload: String,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn read_meta(dir: &Path) -> Result<Option<BaselineMeta>, StoreError> {
        let meta_path = dir.join("meta.json");
        let raw = match std::fs::read(&meta_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        let meta: BaselineMeta = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", meta_path.display())))?;
        Ok(Some(meta))
    }

    fn payload_name(kind: ObservationKind) -> &'static str {
        match kind {
            ObservationKind::Render => "frame.png",
            ObservationKind::Text => "lines.txt",
            ObservationKind::Labels => "labels.txt",
        }
    }
}

#[async_trait]
impl BaselineStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Baseline>, StoreError> {
        let dir = self.key_dir(key);
        let Some(meta) = Self::read_meta(&dir)? else {
            return Ok(None);
        };

        let payload_path = dir.join(&meta.payload);
        let payload = std::fs::read(&payload_path).map_err(io_err)?;
        let observation = Observation::from_payload(meta.kind, &payload)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", payload_path.display())))?;

        Ok(Some(Baseline {
            observation,
            sequence: meta.sequence,
            captured_at: meta.captured_at,
        }))
    }

    async fn save(
        &self,
        key: &str,
        baseline: &Baseline,
        expected_sequence: Option<u64>,
    ) -> Result<(), StoreError> {
        let dir = self.key_dir(key);
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let found = Self::read_meta(&dir)?.map(|m| m.sequence);
        if found != expected_sequence {
            return Err(StoreError::Conflict {
                expected: expected_sequence,
                found,
            });
        }

        let kind = baseline.observation.kind();
        let payload_name = Self::payload_name(kind);
        let payload = baseline
            .observation
            .to_payload()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let payload_tmp = dir.join(format!("{payload_name}.tmp"));
        std::fs::write(&payload_tmp, &payload).map_err(io_err)?;
        std::fs::rename(&payload_tmp, dir.join(payload_name)).map_err(io_err)?;

        let meta = BaselineMeta {
            kind,
            sequence: baseline.sequence,
            captured_at: baseline.captured_at,
            payload: payload_name.to_string(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let meta_tmp = dir.join("meta.json.tmp");
        std::fs::write(&meta_tmp, meta_bytes).map_err(io_err)?;
        std::fs::rename(&meta_tmp, dir.join("meta.json")).map_err(io_err)?;

        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(self.key_dir(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}

fn io_err(e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => StoreError::Auth(e.to_string()),
        _ => StoreError::Transport(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{LabelSet, RenderFrame, TextLines};
    use image::RgbaImage;
    use tempfile::TempDir;

    fn text_baseline(lines: &[&str]) -> Baseline {
        Baseline::first(Observation::Text(TextLines::new(lines.iter().copied())))
    }

    #[tokio::test]
    async fn test_load_absent_is_none_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load("hyrox").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_load_round_trip_per_kind() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let cases = vec![
            ("text", Observation::Text(TextLines::new(["A", "B"]))),
            ("labels", Observation::Labels(LabelSet::new(["Open"]))),
            (
                "render",
                Observation::Render(RenderFrame::new(RgbaImage::new(4, 4))),
            ),
        ];

        for (key, observation) in cases {
            let baseline = Baseline::first(observation.clone());
            store.save(key, &baseline, None).await.unwrap();

            let loaded = store.load(key).await.unwrap().unwrap();
            assert_eq!(loaded.sequence, 1);
            assert_eq!(loaded.observation, observation);
        }
    }

    #[tokio::test]
    async fn test_bootstrap_save_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.save("k", &text_baseline(&["A"]), None).await.unwrap();
        let err = store
            .save("k", &text_baseline(&["B"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_stale_sequence_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let first = text_baseline(&["A"]);
        store.save("k", &first, None).await.unwrap();
        let second = first.next(Observation::Text(TextLines::new(["A", "B"])));
        store.save("k", &second, Some(1)).await.unwrap();

        // A cycle that still believes sequence 1 must not win.
        let stale = first.next(Observation::Text(TextLines::new(["A", "C"])));
        let err = store.save("k", &stale, Some(1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: Some(1),
                found: Some(2)
            }
        ));
    }

    #[tokio::test]
    async fn test_clear_then_load_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.save("k", &text_baseline(&["A"]), None).await.unwrap();
        store.clear("k").await.unwrap();
        assert!(store.load("k").await.unwrap().is_none());

        // Clearing again is a no-op.
        store.clear("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_meta_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        std::fs::create_dir_all(dir.path().join("k")).unwrap();
        std::fs::write(dir.path().join("k/meta.json"), b"not json").unwrap();

        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
