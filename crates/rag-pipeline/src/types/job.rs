//! Job records tracked by the job store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::stage::StageError;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Accepted,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Accepted => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Failed => 2,
        }
    }

    /// Whether a record in this status may be overwritten with `next`
    ///
    /// Terminal records are frozen; otherwise the status may stay or move forward.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result summary of a successful ingestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestSummary {
    /// Number of vectors stored
    pub stored: usize,
    /// Store collaborator acknowledgment payload
    pub acknowledgment: Value,
}

/// Stage errors plus, on success, the result summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobDetails {
    pub errors: Vec<StageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<IngestSummary>,
}

/// Stored state of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub details: JobDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotonic() {
        use JobStatus::*;
        assert!(Accepted.can_transition_to(Running));
        assert!(Accepted.can_transition_to(Failed));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Done));
        assert!(!Running.can_transition_to(Accepted));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Done.can_transition_to(Done));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Accepted).unwrap(), "\"accepted\"");
    }
}
