//! Bounded enrichment queue served by a fixed pool of workers.
//!
//! Submitting never blocks: a full queue rejects the job immediately so the
//! webhook can answer right away. Each accepted job gets a [`JobTicket`]
//! that resolves to the batch report once a worker has run the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use docenrich_shared::{BatchRef, EnrichError, Result, WorkerSettings};

use crate::pipeline::{BatchPipeline, BatchReport};

/// A queued batch and the channel its report goes back on.
struct Job {
    id: Uuid,
    batch: BatchRef,
    reply: oneshot::Sender<BatchReport>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    /// Completed jobs whose upload was not accepted.
    failed_uploads: AtomicU64,
}

/// Point-in-time view of the queue, served by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub workers: usize,
    pub capacity: usize,
    pub queued: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub running: u64,
    pub completed: u64,
    pub failed_uploads: u64,
}

// ---------------------------------------------------------------------------
// JobTicket
// ---------------------------------------------------------------------------

/// Handle to an accepted job.
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub batch: BatchRef,
    report: oneshot::Receiver<BatchReport>,
}

impl JobTicket {
    /// Wait for the job's report. Dropping the ticket does not cancel the job.
    pub async fn outcome(self) -> Result<BatchReport> {
        self.report
            .await
            .map_err(|_| EnrichError::Queue(format!("job {} was dropped", self.job_id)))
    }
}

// ---------------------------------------------------------------------------
// EnrichmentQueue
// ---------------------------------------------------------------------------

/// Producer side of the pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EnrichmentQueue {
    sender: mpsc::Sender<Job>,
    counters: Arc<QueueCounters>,
    workers: usize,
    capacity: usize,
}

impl EnrichmentQueue {
    /// Enqueue a batch without waiting for room.
    pub fn submit(&self, batch: BatchRef) -> Result<JobTicket> {
        let (reply, report) = oneshot::channel();
        let id = Uuid::now_v7();
        let job = Job {
            id,
            batch: batch.clone(),
            reply,
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %id, batch = %batch, "job queued");
                Ok(JobTicket {
                    job_id: id,
                    batch,
                    report,
                })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(batch = %batch, capacity = self.capacity, "enrichment queue full");
                Err(EnrichError::Queue(format!(
                    "queue is full ({} pending)",
                    self.capacity
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(EnrichError::Queue("workers have shut down".into()))
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            workers: self.workers,
            capacity: self.capacity,
            queued: self.capacity - self.sender.capacity(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            running: self.counters.running.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed_uploads: self.counters.failed_uploads.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Consumer side of the pool.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Wait for the workers to drain the queue and exit.
    ///
    /// Workers stop once every [`EnrichmentQueue`] handle has been dropped
    /// and the remaining jobs are done.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task failed");
            }
        }
        info!("all workers stopped");
    }
}

/// Start `settings.workers` workers sharing a queue of `settings.queue_capacity`.
pub fn spawn_workers(
    pipeline: Arc<BatchPipeline>,
    settings: WorkerSettings,
) -> (EnrichmentQueue, WorkerPool) {
    let workers = settings.workers.max(1);
    let capacity = settings.queue_capacity.max(1);

    let (sender, receiver) = mpsc::channel(capacity);
    let receiver = Arc::new(Mutex::new(receiver));
    let counters = Arc::new(QueueCounters::default());

    let handles = (0..workers)
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                Arc::clone(&receiver),
                Arc::clone(&pipeline),
                Arc::clone(&counters),
            ))
        })
        .collect();

    info!(workers, capacity, "enrichment workers started");

    (
        EnrichmentQueue {
            sender,
            counters,
            workers,
            capacity,
        },
        WorkerPool { handles },
    )
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    pipeline: Arc<BatchPipeline>,
    counters: Arc<QueueCounters>,
) {
    loop {
        // Hold the lock only while waiting for the next job.
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        counters.running.fetch_add(1, Ordering::Relaxed);
        let report = pipeline
            .run(&job.batch)
            .instrument(info_span!("job", job_id = %job.id, worker))
            .await;
        counters.running.fetch_sub(1, Ordering::Relaxed);
        counters.completed.fetch_add(1, Ordering::Relaxed);
        if !report.uploaded() {
            counters.failed_uploads.fetch_add(1, Ordering::Relaxed);
        }

        if job.reply.send(report).is_err() {
            debug!(job_id = %job.id, "job ticket dropped before completion");
        }
    }

    debug!(worker, "worker stopped");
}
