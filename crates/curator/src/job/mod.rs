//! Jobs: one plugin run over one object source.

pub mod aggregator;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source::ObjectSource;

pub use aggregator::StatsAggregator;
pub use store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Started,
    Completed,
    Cancelled,
    /// Configuration, source resolution, `init` or `BeforeAll` failed.
    FailedDuringCreation,
    /// The run finished but `AfterAll` or at least one block failed.
    FailedToComplete,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Started => "STARTED",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::FailedDuringCreation => "FAILED_DURING_CREATION",
            JobState::FailedToComplete => "FAILED_TO_COMPLETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(JobState::Created),
            "STARTED" => Some(JobState::Started),
            "COMPLETED" => Some(JobState::Completed),
            "CANCELLED" => Some(JobState::Cancelled),
            "FAILED_DURING_CREATION" => Some(JobState::FailedDuringCreation),
            "FAILED_TO_COMPLETE" => Some(JobState::FailedToComplete),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Created | JobState::Started)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object counters of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: u64,
    pub waiting: u64,
    pub processing: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub completion_percentage: u8,
}

impl JobStats {
    /// Stats of a job whose objects are all still waiting.
    pub fn new(total: u64) -> Self {
        let mut stats = Self {
            total,
            waiting: total,
            ..Self::default()
        };
        stats.recompute();
        stats
    }

    pub fn is_complete(&self) -> bool {
        self.waiting + self.processing == 0
    }

    pub(crate) fn recompute(&mut self) {
        self.completion_percentage = if self.total == 0 {
            100
        } else {
            let done = (self.succeeded + self.failed).min(self.total);
            // Floored, so 100 only once every object is done
            (done * 100 / self.total) as u8
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub plugin_id: String,
    pub plugin_version: String,
    /// User that submitted the job.
    pub owner: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub source: ObjectSource,
    pub state: JobState,
    pub stats: JobStats,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the job failed, when it did.
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        plugin_id: &str,
        plugin_version: &str,
        owner: Option<&str>,
        parameters: BTreeMap<String, String>,
        source: ObjectSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plugin_id: plugin_id.to_string(),
            plugin_version: plugin_version.to_string(),
            owner: owner.map(str::to_string),
            parameters,
            source,
            state: JobState::Created,
            stats: JobStats::default(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    pub fn start(&mut self, total: u64) {
        self.state = JobState::Started;
        self.stats = JobStats::new(total);
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, state: JobState, error: Option<String>) {
        self.state = state;
        self.ended_at = Some(Utc::now());
        if error.is_some() {
            self.error = error;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectKind;

    #[test]
    fn test_completion_percentage() {
        let mut stats = JobStats::new(3);
        assert_eq!(stats.completion_percentage, 0);
        assert!(!stats.is_complete());

        stats.waiting = 0;
        stats.succeeded = 2;
        stats.processing = 1;
        stats.recompute();
        assert_eq!(stats.completion_percentage, 66);

        let mut almost = JobStats::new(200);
        almost.waiting = 0;
        almost.succeeded = 199;
        almost.processing = 1;
        almost.recompute();
        assert_eq!(almost.completion_percentage, 99);
        assert!(!almost.is_complete());

        assert_eq!(JobStats::new(0).completion_percentage, 100);
        assert!(JobStats::new(0).is_complete());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new(
            "fixity-check",
            "1.0",
            Some("alice"),
            BTreeMap::new(),
            ObjectSource::All {
                kind: ObjectKind::File,
            },
        );
        assert_eq!(job.state, JobState::Created);
        assert!(Uuid::parse_str(&job.id).is_ok());

        job.start(4);
        assert_eq!(job.stats.waiting, 4);
        assert!(job.started_at.is_some());

        job.finish(JobState::Cancelled, None);
        assert!(job.is_finished());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_state_strings() {
        for state in [
            JobState::Created,
            JobState::Started,
            JobState::Completed,
            JobState::Cancelled,
            JobState::FailedDuringCreation,
            JobState::FailedToComplete,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("RUNNING"), None);
        assert_eq!(
            serde_json::to_string(&JobState::FailedToComplete).unwrap(),
            "\"FAILED_TO_COMPLETE\""
        );
    }
}
