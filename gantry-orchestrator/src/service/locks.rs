//! Per-pipeline mutual exclusion
//!
//! Every read-decide-write sequence on a pipeline runs while holding that
//! pipeline's guard. Guards for different pipelines are independent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct PipelineLocks {
    table: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl PipelineLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `pipeline_id`
    pub async fn lock(&self, pipeline_id: i64) -> PipelineGuard {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(pipeline_id).or_default())
        };

        let guard = entry.lock_owned().await;

        PipelineGuard {
            pipeline_id,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Number of pipelines with a live guard or waiter
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one pipeline, released on drop
#[derive(Debug)]
pub struct PipelineGuard {
    pipeline_id: i64,
    table: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PipelineGuard {
    pub fn pipeline_id(&self) -> i64 {
        self.pipeline_id
    }
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        // Release first so the table entry is the only remaining owner
        // unless someone else is waiting on it.
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = table.get(&self.pipeline_id) {
            if Arc::strong_count(entry) == 1 {
                table.remove(&self.pipeline_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = PipelineLocks::new();
        {
            let guard = locks.lock(1).await;
            assert_eq!(guard.pipeline_id(), 1);
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_pipeline_is_serialized() {
        let locks = PipelineLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(42).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_pipelines_do_not_block() {
        let locks = PipelineLocks::new();
        let _first = locks.lock(1).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(second.is_ok());
    }
}
