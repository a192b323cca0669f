use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one job: `Pending -> Running -> {Completed, Failed,
/// TimedOut}`. Terminal states never transition again; the record they
/// live in expires with its TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut
        )
    }
}

/// The authoritative status record for one job, written to the job
/// store as a full-record replacement. Fields accumulate monotonically
/// as the job advances; once a terminal state is written the record is
/// never mutated again.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub status: JobState,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecord {
    /// Fresh record as written at submission time, before any worker
    /// has claimed the job.
    pub fn pending(submitted_at: DateTime<Utc>) -> Self {
        Self {
            status: JobState::Pending,
            submitted_at,
            started_at: None,
            finished_at: None,
            stdout: None,
            stderr: None,
            exit_code: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let record = JobRecord::pending(Utc::now());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""status":"Pending""#));
        assert!(json.contains(r#""submittedAt""#));
        assert!(!json.contains("startedAt"));
        assert!(!json.contains("exitCode"));
    }

    #[test]
    fn round_trips_terminal_record() {
        let record = JobRecord {
            status: JobState::TimedOut,
            finished_at: Some(Utc::now()),
            stdout: Some("partial".into()),
            stderr: Some("[Process killed: timeout]\n".into()),
            ..JobRecord::pending(Utc::now())
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, JobState::TimedOut);
        assert_eq!(back.exit_code, None);
        assert_eq!(back.stdout.as_deref(), Some("partial"));
    }
}
