//! In-memory dispatch state: the pending priority queue plus the in-flight
//! set. All mutation happens under a single lock owned by the scheduler.

use std::collections::HashSet;

/// A queued reference to a persisted job.
#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub job_id: String,
    pub priority: u8,
}

/// Priority queue with stable FIFO ordering on ties, plus the set of jobs
/// currently executing.
#[derive(Debug, Default)]
pub(crate) struct DispatchState {
    queue: Vec<QueuedJob>,
    active: HashSet<String>,
}

impl DispatchState {
    /// Insert a job in priority order (descending; ties keep insertion
    /// order). Returns false when the job is already queued or in flight.
    pub fn enqueue(&mut self, job: QueuedJob) -> bool {
        if self.active.contains(&job.job_id)
            || self.queue.iter().any(|queued| queued.job_id == job.job_id)
        {
            return false;
        }

        match self.queue.iter().position(|queued| queued.priority < job.priority) {
            Some(index) => self.queue.insert(index, job),
            None => self.queue.push(job),
        }
        true
    }

    /// Pop the highest-priority job and mark it in flight, or None when the
    /// queue is empty or the concurrency cap is reached.
    pub fn pop_next(&mut self, max_concurrent: usize) -> Option<QueuedJob> {
        if self.queue.is_empty() || self.active.len() >= max_concurrent {
            return None;
        }
        let job = self.queue.remove(0);
        self.active.insert(job.job_id.clone());
        Some(job)
    }

    /// Remove a finished job from the in-flight set.
    pub fn finish(&mut self, job_id: &str) {
        self.active.remove(job_id);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }
}
