//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish side of the job update fan-out. It is shared
//! via `Arc<EventBus>` between the orchestrator and the WebSocket layer.

use aigpic_core::job::{Job, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::subscription::JobSubscription;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A committed job state change.
///
/// Carries the complete record rather than a delta, so a subscriber that
/// missed earlier events still converges on the latest state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job: Job,

    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            timestamp: Utc::now(),
        }
    }

    /// Dot-separated event name, e.g. `"job.succeeded"`.
    pub fn event_type(&self) -> &'static str {
        match self.job.status {
            JobStatus::Queued => "job.queued",
            JobStatus::Running => "job.running",
            JobStatus::Succeeded => "job.succeeded",
            JobStatus::Failed => "job.failed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Each subscriber has its own cursor into a bounded ring. When a subscriber
/// falls `capacity` events behind, its oldest unread events are dropped; the
/// publisher and the other subscribers are unaffected.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Never blocks.
    pub fn publish(&self, event: JobEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            job_id = %event.job.job_id,
            subscribers = self.sender.receiver_count(),
            "Publishing job event",
        );
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> JobSubscription {
        JobSubscription::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
