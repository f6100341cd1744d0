//! Owned job store.
//!
//! Jobs live in a sharded [`DashMap`]; each entry carries its own lock, a
//! cancellation token for the driving task and a `watch` channel that
//! broadcasts state changes to waiters. The job lock is never held across
//! an `.await`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{GenrelayError, Result};
use crate::state_machine::{Job, JobError, JobId, JobSnapshot, JobState};

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    /// The job had already succeeded or failed; nothing changed.
    AlreadyTerminal,
}

pub struct JobEntry {
    id: JobId,
    job: Mutex<Job>,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (state, _) = watch::channel(job.state);
        Self {
            id: job.id,
            job: Mutex::new(job),
            cancel: CancellationToken::new(),
            state,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot::from_job(&self.job.lock())
    }

    pub fn is_terminal(&self) -> bool {
        self.job.lock().is_terminal()
    }

    /// Runs `f` against the job under its lock and publishes the resulting
    /// state to waiters before the lock is released, so the published state
    /// always follows the order of updates.
    pub fn update<R>(&self, f: impl FnOnce(&mut Job) -> R) -> R {
        let mut job = self.job.lock();
        let out = f(&mut job);
        let current = job.state;
        self.state.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
        drop(job);
        out
    }

    /// State last published to waiters.
    pub fn published_state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Token the driving task races its suspension points against.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails a non-terminal job with [`JobError::Cancelled`] and stops its
    /// driving task.
    pub fn cancel(&self) -> CancelOutcome {
        let outcome = self.update(|job| match job.fail(JobError::Cancelled) {
            Ok(()) => CancelOutcome::Cancelled,
            Err(_) => CancelOutcome::AlreadyTerminal,
        });
        if outcome == CancelOutcome::Cancelled {
            self.cancel.cancel();
            info!(job = %self.id, "job cancelled");
        }
        outcome
    }

    /// Resolves once the job is SUCCEEDED or FAILED.
    pub async fn wait_terminal(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot close early.
        let _ = rx.wait_for(JobState::is_terminal).await;
    }
}

#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<JobId, Arc<JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Arc<JobEntry> {
        let entry = Arc::new(JobEntry::new(job));
        self.jobs.insert(entry.id(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: JobId) -> Result<Arc<JobEntry>> {
        self.jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(GenrelayError::JobNotFound(id))
    }

    pub fn snapshot(&self, id: JobId) -> Result<JobSnapshot> {
        Ok(self.get(id)?.snapshot())
    }

    pub fn cancel(&self, id: JobId) -> Result<CancelOutcome> {
        Ok(self.get(id)?.cancel())
    }

    /// Drops a terminal job. Returns `false` (and keeps the job) while it is
    /// still pending or running.
    pub fn forget(&self, id: JobId) -> Result<bool> {
        let entry = self.get(id)?;
        if !entry.is_terminal() {
            return Ok(false);
        }
        self.jobs.remove(&id);
        Ok(true)
    }

    /// Evicts terminal jobs that finished more than `older_than` ago.
    /// Returns how many were removed.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut purged = 0;
        self.jobs.retain(|_, entry| {
            let expired = entry
                .job
                .lock()
                .finished_at
                .is_some_and(|finished| finished <= cutoff);
            if expired {
                purged += 1;
            }
            !expired
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GenerationKind;

    #[test]
    fn insert_and_snapshot() {
        let store = JobStore::new();
        let entry = store.insert(Job::new(GenerationKind::Text));
        let snap = store.snapshot(entry.id()).unwrap();
        assert_eq!(snap.state, JobState::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = JobStore::new();
        let id = JobId::new();
        assert!(matches!(store.snapshot(id), Err(GenrelayError::JobNotFound(x)) if x == id));
        assert!(store.cancel(id).is_err());
    }

    #[test]
    fn cancel_fails_job_and_trips_token() {
        let store = JobStore::new();
        let entry = store.insert(Job::new(GenerationKind::Video));
        entry.update(|job| job.begin_attempt("wan")).unwrap();

        assert_eq!(store.cancel(entry.id()).unwrap(), CancelOutcome::Cancelled);
        assert!(entry.cancellation().is_cancelled());

        let snap = entry.snapshot();
        assert_eq!(snap.state, JobState::Failed);
        assert_eq!(snap.error, Some(JobError::Cancelled));
        assert_eq!(store.cancel(entry.id()).unwrap(), CancelOutcome::AlreadyTerminal);
    }

    #[test]
    fn forget_keeps_live_jobs() {
        let store = JobStore::new();
        let entry = store.insert(Job::new(GenerationKind::Text));
        assert!(!store.forget(entry.id()).unwrap());
        entry.cancel();
        assert!(store.forget(entry.id()).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn purge_only_removes_old_terminal_jobs() {
        let store = JobStore::new();
        let done = store.insert(Job::new(GenerationKind::Text));
        let live = store.insert(Job::new(GenerationKind::Text));
        done.cancel();

        assert_eq!(store.purge_finished(Duration::from_secs(3600)), 0);
        assert_eq!(store.purge_finished(Duration::ZERO), 1);
        assert!(store.get(done.id()).is_err());
        assert!(store.get(live.id()).is_ok());
    }

    #[tokio::test]
    async fn wait_terminal_wakes_on_cancel() {
        let store = JobStore::new();
        let entry = store.insert(Job::new(GenerationKind::Audio));

        let waiter = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move { entry.wait_terminal().await })
        };
        tokio::task::yield_now().await;
        entry.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn published_state_matches_job_under_concurrent_cancel() {
        for _ in 0..200 {
            let store = JobStore::new();
            let entry = store.insert(Job::new(GenerationKind::Video));
            entry.update(|job| job.begin_attempt("wan")).unwrap();

            let writer = {
                let entry = Arc::clone(&entry);
                std::thread::spawn(move || {
                    for p in 1..=50u8 {
                        entry.update(|job| job.advance_progress(p));
                    }
                })
            };
            let canceller = {
                let entry = Arc::clone(&entry);
                std::thread::spawn(move || entry.cancel())
            };
            writer.join().unwrap();
            assert_eq!(canceller.join().unwrap(), CancelOutcome::Cancelled);

            assert_eq!(entry.published_state(), JobState::Failed);
            assert_eq!(entry.snapshot().state, entry.published_state());
        }
    }

    #[tokio::test]
    async fn wait_terminal_returns_immediately_when_done() {
        let store = JobStore::new();
        let entry = store.insert(Job::new(GenerationKind::Audio));
        entry.cancel();
        tokio::time::timeout(Duration::from_millis(100), entry.wait_terminal())
            .await
            .unwrap();
    }
}
