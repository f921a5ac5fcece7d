//! # Working Files
//!
//! Every transform owns exactly two names in the engine's scratch namespace:
//! `<id>.mp3` (the staged upload) and `<id>-enc.mp3` (the engine's output).
//! The id is a random v4 UUID, so concurrent requests never touch each other's files.
//!
//! ## Release on every exit path
//! The orchestrator calls [`WorkingFiles::release`] once the pipeline has finished,
//! whatever the outcome. A name stays pending until its deletion has completed,
//! so if the owning future is dropped first (client disconnect, handler cancelled,
//! even halfway through `release`), `Drop` hands the remaining deletions to a
//! background task on the current runtime.

use crate::transform::engine::FilterEngine;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct WorkingFiles {
    id: Uuid,
    source: String,
    encoded: String,
    engine: Arc<dyn FilterEngine>,
    /// Names whose deletion has not completed yet.
    pending: Vec<String>,
}

impl WorkingFiles {
    /// Reserve a fresh pair of names. Nothing is written yet.
    pub fn allocate(engine: Arc<dyn FilterEngine>) -> Self {
        let id = Uuid::new_v4();
        let source = format!("{}.mp3", id);
        let encoded = format!("{}-enc.mp3", id);
        Self {
            id,
            pending: vec![source.clone(), encoded.clone()],
            source,
            encoded,
            engine,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source
    }

    pub fn encoded_name(&self) -> &str {
        &self.encoded
    }

    /// Delete both files. Returns how many deletions failed; failures are logged
    /// and never turned into errors.
    pub async fn release(mut self) -> usize {
        let engine = Arc::clone(&self.engine);
        let mut failures = 0;
        while let Some(name) = self.pending.last().cloned() {
            if !remove_one(engine.as_ref(), &name).await {
                failures += 1;
            }
            self.pending.pop();
        }
        failures
    }
}

impl Drop for WorkingFiles {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let names = std::mem::take(&mut self.pending);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(id = %self.id, pending = names.len(), "Working files dropped before release, cleaning up in background");
                runtime.spawn(async move {
                    for name in &names {
                        remove_one(engine.as_ref(), name).await;
                    }
                });
            }
            Err(_) => {
                warn!(id = %self.id, "No runtime available, scratch files may be left behind");
            }
        }
    }
}

async fn remove_one(engine: &dyn FilterEngine, name: &str) -> bool {
    match engine.delete_file(name).await {
        Ok(()) => true,
        Err(e) => {
            warn!(file = %name, error = %e, "Failed to delete scratch file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::testing::MemoryEngine;
    use std::time::Duration;

    #[test]
    fn test_names_share_unique_id() {
        let engine: Arc<dyn FilterEngine> = Arc::new(MemoryEngine::new());
        let a = WorkingFiles::allocate(engine.clone());
        let b = WorkingFiles::allocate(engine);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.source_name(), format!("{}.mp3", a.id()));
        assert_eq!(a.encoded_name(), format!("{}-enc.mp3", a.id()));
    }

    #[tokio::test]
    async fn test_release_deletes_both_files() {
        let engine = Arc::new(MemoryEngine::new());
        let files = WorkingFiles::allocate(engine.clone());
        engine.write_file(files.source_name(), b"in").await.unwrap();
        engine.write_file(files.encoded_name(), b"out").await.unwrap();

        assert_eq!(files.release().await, 0);
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_release_continues_after_failed_delete() {
        let engine = Arc::new(MemoryEngine::new().failing_delete());
        let files = WorkingFiles::allocate(engine.clone());
        engine.write_file(files.source_name(), b"in").await.unwrap();

        assert_eq!(files.release().await, 2);
        assert_eq!(engine.delete_attempts(), 2);
    }

    #[tokio::test]
    async fn test_drop_without_release_cleans_up() {
        let engine = Arc::new(MemoryEngine::new());
        {
            let files = WorkingFiles::allocate(engine.clone());
            engine.write_file(files.source_name(), b"in").await.unwrap();
        }

        for _ in 0..50 {
            if engine.file_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.file_count(), 0);
    }

    #[tokio::test]
    async fn test_release_cancelled_midway_still_cleans_up() {
        let engine = Arc::new(MemoryEngine::new().with_delete_delay(Duration::from_millis(10)));
        let files = WorkingFiles::allocate(engine.clone());
        engine.write_file(files.source_name(), b"in").await.unwrap();
        engine.write_file(files.encoded_name(), b"out").await.unwrap();

        let cancelled = tokio::time::timeout(Duration::from_millis(5), files.release()).await;
        assert!(cancelled.is_err());

        for _ in 0..50 {
            if engine.file_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.file_count(), 0);
    }
}
