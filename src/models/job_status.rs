//! Sync job lifecycle states.
//!
//! Jobs move strictly forward: queued -> running -> succeeded | failed, with
//! cancellation allowed only while queued. Terminal rows are never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle state of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Return the canonical string representation for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal. Terminal jobs never transition again.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All job statuses, in lifecycle order.
pub const ALL_JOB_STATUSES: &[JobStatus] = &[
    JobStatus::Queued,
    JobStatus::Running,
    JobStatus::Succeeded,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

/// Return the status corresponding to the provided string, if any.
pub fn parse_job_status(value: &str) -> Option<JobStatus> {
    ALL_JOB_STATUSES
        .iter()
        .copied()
        .find(|status| status.as_str() == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for status in ALL_JOB_STATUSES {
            let parsed = parse_job_status(status.as_str()).expect("status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
