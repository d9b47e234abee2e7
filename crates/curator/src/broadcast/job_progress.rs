use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{JobState, JobStats};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Started,
    BlockDispatched,
    BlockCompleted,
    Finished,
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressKind::Started => write!(f, "Started"),
            ProgressKind::BlockDispatched => write!(f, "Block dispatched"),
            ProgressKind::BlockCompleted => write!(f, "Block completed"),
            ProgressKind::Finished => write!(f, "Finished"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub plugin_id: String,
    pub kind: ProgressKind,
    pub state: JobState,
    /// Statistics right after the change this event reports.
    pub stats: JobStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<u64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(
        job_id: &str,
        plugin_id: &str,
        kind: ProgressKind,
        state: JobState,
        stats: JobStats,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            plugin_id: plugin_id.to_string(),
            kind,
            state,
            stats,
            block_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_block(mut self, block_id: u64) -> Self {
        self.block_id = Some(block_id);
        self
    }
}

/// Fans job progress events out to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::new(
            "job-1",
            "fixity-check",
            ProgressKind::Started,
            JobState::Started,
            JobStats::new(3),
            "started",
        ));
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let broadcaster = JobProgressBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::new(
            "job-1",
            "fixity-check",
            ProgressKind::Started,
            JobState::Started,
            JobStats::new(3),
            "started",
        ));
        broadcaster.send(
            JobProgressEvent::new(
                "job-1",
                "fixity-check",
                ProgressKind::BlockDispatched,
                JobState::Started,
                JobStats::new(3),
                "block 1",
            )
            .for_block(1),
        );

        assert_eq!(rx.try_recv().unwrap().kind, ProgressKind::Started);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ProgressKind::BlockDispatched);
        assert_eq!(event.block_id, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = JobProgressEvent::new(
            "job-1",
            "premis-skeleton",
            ProgressKind::Finished,
            JobState::Completed,
            JobStats::new(0),
            "done",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["kind"], "finished");
        assert_eq!(json["state"], "COMPLETED");
        assert_eq!(json["stats"]["completion_percentage"], 100);
        assert!(json.get("blockId").is_none());
    }
}
