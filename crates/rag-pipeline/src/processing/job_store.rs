//! Process-wide job state

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::job::{JobDetails, JobRecord, JobStatus};

/// Counts of jobs per status
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub accepted: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Mapping from job id to job state
///
/// Writes are last-write-wins except that a terminal job never changes again.
pub trait JobStore: Send + Sync {
    /// Create or overwrite the record for `job_id`
    fn put(&self, job_id: &str, status: JobStatus, details: JobDetails) -> Result<JobRecord>;

    /// Create the record for `job_id`, failing if it already exists
    ///
    /// The check and the insert are one atomic step, so of several callers
    /// racing on the same id exactly one succeeds.
    fn insert_new(
        &self,
        job_id: &str,
        status: JobStatus,
        details: JobDetails,
    ) -> Result<JobRecord>;

    fn get(&self, job_id: &str) -> Option<JobRecord>;

    /// All records, newest first
    fn list(&self) -> Vec<JobRecord>;

    fn stats(&self) -> JobStats;
}

/// Concurrent in-memory job store
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<String, JobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_record(job_id: &str, status: JobStatus, details: JobDetails) -> JobRecord {
    let now = Utc::now();
    JobRecord {
        job_id: job_id.to_string(),
        status,
        details,
        created_at: now,
        updated_at: now,
    }
}

impl JobStore for InMemoryJobStore {
    fn put(&self, job_id: &str, status: JobStatus, details: JobDetails) -> Result<JobRecord> {
        let now = Utc::now();
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if !record.status.can_transition_to(status) {
                    tracing::error!(
                        "Rejected job update {}: {} -> {}",
                        job_id,
                        record.status,
                        status
                    );
                    return Err(Error::InvalidTransition {
                        job_id: job_id.to_string(),
                        from: record.status.to_string(),
                        to: status.to_string(),
                    });
                }
                record.status = status;
                record.details = details;
                record.updated_at = now;
                Ok(record.clone())
            }
            Entry::Vacant(vacant) => {
                let record = new_record(job_id, status, details);
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }

    fn insert_new(
        &self,
        job_id: &str,
        status: JobStatus,
        details: JobDetails,
    ) -> Result<JobRecord> {
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(Error::invalid_input(format!(
                "job {} already exists",
                job_id
            ))),
            Entry::Vacant(vacant) => {
                let record = new_record(job_id, status, details);
                vacant.insert(record.clone());
                Ok(record)
            }
        }
    }

    fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|r| r.value().clone())
    }

    fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for record in self.jobs.iter() {
            stats.total += 1;
            match record.status {
                JobStatus::Accepted => stats.accepted += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_and_get() {
        let store = InMemoryJobStore::new();
        assert!(store.get("a").is_none());

        store.put("a", JobStatus::Accepted, JobDetails::default()).unwrap();
        let record = store.get("a").unwrap();
        assert_eq!(record.status, JobStatus::Accepted);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let store = InMemoryJobStore::new();
        store.put("a", JobStatus::Accepted, JobDetails::default()).unwrap();
        store.put("a", JobStatus::Running, JobDetails::default()).unwrap();
        store.put("a", JobStatus::Done, JobDetails::default()).unwrap();

        let err = store
            .put("a", JobStatus::Running, JobDetails::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(store.put("a", JobStatus::Failed, JobDetails::default()).is_err());
        assert_eq!(store.get("a").unwrap().status, JobStatus::Done);
    }

    #[test]
    fn test_no_regression_to_accepted() {
        let store = InMemoryJobStore::new();
        store.put("a", JobStatus::Running, JobDetails::default()).unwrap();
        assert!(store.put("a", JobStatus::Accepted, JobDetails::default()).is_err());
    }

    #[test]
    fn test_stats_and_list() {
        let store = InMemoryJobStore::new();
        store.put("a", JobStatus::Accepted, JobDetails::default()).unwrap();
        store.put("b", JobStatus::Running, JobDetails::default()).unwrap();
        store.put("c", JobStatus::Failed, JobDetails::default()).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_insert_new_rejects_existing() {
        let store = InMemoryJobStore::new();
        store
            .insert_new("a", JobStatus::Accepted, JobDetails::default())
            .unwrap();
        let err = store
            .insert_new("a", JobStatus::Accepted, JobDetails::default())
            .unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::MalformedInput);
    }

    #[test]
    fn test_insert_new_race_has_one_winner() {
        let store = Arc::new(InMemoryJobStore::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .insert_new("shared", JobStatus::Accepted, JobDetails::default())
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.stats().total, 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(InMemoryJobStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let id = format!("job-{}-{}", i, j);
                        store.put(&id, JobStatus::Accepted, JobDetails::default()).unwrap();
                        store.put(&id, JobStatus::Done, JobDetails::default()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.stats().done, 400);
    }
}
