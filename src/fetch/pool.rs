//! Bounded fetch pool, running at most N transports at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;

use crate::types::TaskId;

use super::{FetchListener, FetchTask, ProgressSink, Transport};

/// Spawns fetch tasks under a concurrency cap
pub struct FetchPool {
    transport: Arc<dyn Transport>,
    listener: Arc<dyn FetchListener>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl FetchPool {
    /// Create a pool allowing `max_concurrent` in-flight fetches
    pub fn new(
        transport: Arc<dyn Transport>,
        listener: Arc<dyn FetchListener>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            transport,
            listener,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh task handle
    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a task; it starts once a permit is free
    ///
    /// The listener receives exactly one terminal callback for the task.
    pub fn submit(&self, task: FetchTask) -> tokio::task::JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let listener = Arc::clone(&self.listener);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    listener
                        .on_failed(task.id, "fetch pool closed".to_string())
                        .await;
                    return;
                }
            };

            tracing::debug!(
                task_id = %task.id,
                part_id = %task.part_id,
                url = %task.url,
                "fetch started"
            );

            let sink = ProgressSink::new(task.id, Arc::clone(&listener));
            let result = transport.fetch(&task, &sink).await;
            drop(permit);

            match result {
                Ok(path) => listener.on_finished(task.id, path).await,
                Err(e) => {
                    tracing::debug!(task_id = %task.id, error = %e, "fetch failed");
                    listener.on_failed(task.id, e.to_string()).await;
                }
            }
        })
    }

    /// Stop starting queued tasks; they fail with a pool-closed error
    pub fn close(&self) {
        self.permits.close();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::types::{JobId, PartId};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Transport that sleeps and tracks peak concurrency
    struct SlowTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
        fail_every_other: bool,
    }

    #[async_trait::async_trait]
    impl Transport for SlowTransport {
        async fn fetch(&self, task: &FetchTask, progress: &ProgressSink) -> Result<PathBuf> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            progress.report(5, Some(10)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;

            self.current.fetch_sub(1, Ordering::SeqCst);
            if self.fail_every_other && task.id.0 % 2 == 0 {
                Err(Error::Other("connection reset".to_string()))
            } else {
                Ok(task.temp_path.clone())
            }
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        progress: Mutex<Vec<TaskId>>,
        terminal: Mutex<Vec<(TaskId, bool)>>,
    }

    #[async_trait::async_trait]
    impl FetchListener for RecordingListener {
        async fn on_progress(&self, task_id: TaskId, _written: u64, _expected: Option<u64>) {
            self.progress.lock().await.push(task_id);
        }

        async fn on_finished(&self, task_id: TaskId, _temp_path: PathBuf) {
            self.terminal.lock().await.push((task_id, true));
        }

        async fn on_failed(&self, task_id: TaskId, _error: String) {
            self.terminal.lock().await.push((task_id, false));
        }
    }

    fn task(pool: &FetchPool) -> FetchTask {
        let id = pool.next_task_id();
        FetchTask {
            id,
            job_id: JobId::new(),
            part_id: PartId::new(),
            url: format!("http://example.invalid/{id}"),
            token: None,
            temp_path: PathBuf::from(format!("/tmp/{id}.part")),
        }
    }

    fn transport(fail_every_other: bool) -> Arc<SlowTransport> {
        Arc::new(SlowTransport {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_every_other,
        })
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_cap() {
        let transport = transport(false);
        let listener = Arc::new(RecordingListener::default());
        let pool = FetchPool::new(transport.clone(), listener.clone(), 5);

        let handles: Vec<_> = (0..12).map(|_| pool.submit(task(&pool))).collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency {peak} exceeded cap");
        assert!(peak >= 2, "tasks should overlap, peak was {peak}");
        assert_eq!(listener.terminal.lock().await.len(), 12);
    }

    #[tokio::test]
    async fn every_task_gets_exactly_one_terminal_callback() {
        let transport = transport(true);
        let listener = Arc::new(RecordingListener::default());
        let pool = FetchPool::new(transport, listener.clone(), 3);

        let handles: Vec<_> = (0..6).map(|_| pool.submit(task(&pool))).collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut terminal = listener.terminal.lock().await.clone();
        terminal.sort_by_key(|(id, _)| id.0);
        let ids: Vec<u64> = terminal.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        for (id, ok) in terminal {
            assert_eq!(ok, id.0 % 2 == 1, "task {id}");
        }
        assert_eq!(listener.progress.lock().await.len(), 6);
    }

    #[tokio::test]
    async fn closed_pool_fails_queued_tasks() {
        let listener = Arc::new(RecordingListener::default());
        let pool = FetchPool::new(transport(false), listener.clone(), 1);
        pool.close();

        pool.submit(task(&pool)).await.unwrap();

        assert_eq!(listener.terminal.lock().await.as_slice(), &[(TaskId(1), false)]);
        assert!(listener.progress.lock().await.is_empty());
    }

    #[test]
    fn task_ids_are_unique() {
        let pool = FetchPool::new(
            transport(false),
            Arc::new(RecordingListener::default()),
            1,
        );
        let a = pool.next_task_id();
        let b = pool.next_task_id();
        assert_ne!(a, b);
    }
}
