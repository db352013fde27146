//! Progress aggregator: throttled job snapshots and exactly-once finalization.
//!
//! Callbacks merge part states into an in-memory snapshot map under the write lock. A single
//! background loop reads the map, emits one [`Event::JobProgress`] per job per pass, and hands
//! every fully done job to the [`JobFinalizer`] exactly once. The loop exits when a pass starts
//! with an empty map; the next update starts a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};

use crate::types::{DownloadJob, Event, JobId, PartId, PartState};

/// Receives jobs once every part reached a terminal state
#[async_trait::async_trait]
pub(crate) trait JobFinalizer: Send + Sync {
    async fn finalize(&self, job: DownloadJob);
}

struct Snapshots {
    jobs: HashMap<JobId, DownloadJob>,
    /// Set and cleared only under the write lock
    loop_running: bool,
}

struct Inner {
    snapshots: RwLock<Snapshots>,
    event_tx: broadcast::Sender<Event>,
    finalizer: Arc<dyn JobFinalizer>,
    interval: Duration,
    loops_started: AtomicU64,
    finalizing: AtomicUsize,
}

/// Shared handle to the snapshot map and its notification loop
#[derive(Clone)]
pub(crate) struct ProgressAggregator {
    inner: Arc<Inner>,
}

impl ProgressAggregator {
    pub(crate) fn new(
        event_tx: broadcast::Sender<Event>,
        finalizer: Arc<dyn JobFinalizer>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshots: RwLock::new(Snapshots {
                    jobs: HashMap::new(),
                    loop_running: false,
                }),
                event_tx,
                finalizer,
                interval,
                loops_started: AtomicU64::new(0),
                finalizing: AtomicUsize::new(0),
            }),
        }
    }

    /// Merge one part's new state into the snapshot of its job
    ///
    /// `job` is inserted as-is when the job is not tracked yet; otherwise only the given part
    /// is updated, and never out of a terminal state.
    pub(crate) async fn update_part(&self, job: DownloadJob, part_id: PartId, state: PartState) {
        let mut snapshots = self.inner.snapshots.write().await;

        match snapshots.jobs.get_mut(&job.id) {
            Some(existing) => {
                if let Some(part) = existing.part_mut(part_id)
                    && !part.state.is_done()
                {
                    part.state = state;
                }
            }
            None => {
                snapshots.jobs.insert(job.id, job);
            }
        }

        self.ensure_loop(&mut snapshots);
    }

    /// Track a whole job snapshot, replacing any previous one
    pub(crate) async fn track(&self, job: DownloadJob) {
        let mut snapshots = self.inner.snapshots.write().await;
        snapshots.jobs.insert(job.id, job);
        self.ensure_loop(&mut snapshots);
    }

    /// Snapshot of a tracked job
    pub(crate) async fn snapshot(&self, job_id: JobId) -> Option<DownloadJob> {
        self.inner.snapshots.read().await.jobs.get(&job_id).cloned()
    }

    /// No loop running and no finalization in flight
    pub(crate) async fn is_idle(&self) -> bool {
        let running = self.inner.snapshots.read().await.loop_running;
        !running && self.inner.finalizing.load(Ordering::SeqCst) == 0
    }

    /// Poll until idle or until `timeout` elapses; returns whether idle was reached
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            while !self.is_idle().await {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// How many loops were started so far
    #[cfg(test)]
    pub(crate) fn loops_started(&self) -> u64 {
        self.inner.loops_started.load(Ordering::SeqCst)
    }

    fn ensure_loop(&self, snapshots: &mut Snapshots) {
        if snapshots.loop_running {
            return;
        }
        snapshots.loop_running = true;
        self.inner.loops_started.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { run_loop(inner).await });
    }
}

async fn run_loop(inner: Arc<Inner>) {
    tracing::debug!("progress loop started");

    loop {
        let jobs: Vec<DownloadJob> = {
            let snapshots = inner.snapshots.read().await;
            snapshots.jobs.values().cloned().collect()
        };

        if jobs.is_empty() {
            let mut snapshots = inner.snapshots.write().await;
            if snapshots.jobs.is_empty() {
                snapshots.loop_running = false;
                tracing::debug!("progress loop idle");
                return;
            }
            // An update slipped in between the two locks
            continue;
        }

        for job in jobs {
            let done = job.is_done();
            let job_id = job.id;
            inner.event_tx.send(Event::JobProgress { job }).ok();

            if !done {
                continue;
            }

            let removed = inner.snapshots.write().await.jobs.remove(&job_id);
            if let Some(job) = removed {
                tracing::debug!(job_id = %job_id, "job fully done, finalizing");
                inner.finalizing.fetch_add(1, Ordering::SeqCst);
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    inner.finalizer.finalize(job).await;
                    inner.finalizing.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }

        tokio::time::sleep(inner.interval).await;
    }
}
