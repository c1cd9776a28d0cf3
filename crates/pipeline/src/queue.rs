//! In-memory ready queue of admitted jobs.
//!
//! Jobs are claimed oldest first by `(created_at, job_id)`. A pop happens
//! under the queue mutex, so each job is handed to exactly one worker.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use aigpic_core::job::PendingJob;
use tokio::sync::Notify;

/// Heap entry ordered by admission key.
struct Entry(PendingJob);

impl Entry {
    fn key(&self) -> (chrono::DateTime<chrono::Utc>, uuid::Uuid) {
        (self.0.job.created_at, self.0.job.job_id)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// FIFO queue of jobs waiting for a worker.
#[derive(Default)]
pub struct ReadyQueue {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job and wake one waiting worker.
    pub fn push(&self, job: PendingJob) {
        self.lock().push(Reverse(Entry(job)));
        self.notify.notify_one();
    }

    /// Remove and return the oldest job, if any.
    pub fn try_pop(&self) -> Option<PendingJob> {
        self.lock().pop().map(|Reverse(Entry(job))| job)
    }

    /// Wait until a job is available and claim it.
    ///
    /// Cancel-safe: a job is only removed in the same poll that returns it.
    pub async fn claim(&self) -> PendingJob {
        loop {
            // Register as a waiter before checking so each concurrent push
            // wakes a distinct claimer.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(job) = self.try_pop() {
                return job;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BinaryHeap<Reverse<Entry>>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
