//! The generation job record and its lifecycle.
//!
//! A job moves `queued -> running -> succeeded | failed` and never leaves a
//! terminal state. Transitions are methods on [`Job`] so the store only ever
//! receives records that passed through a legal transition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// The lowercase name stored in the `jobs.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One generation request and its tracked lifecycle.
///
/// This is the full record served by queries and carried by every
/// status-change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub prompt: String,
    pub requested_count: u32,
    pub config_name: String,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    /// Filenames of the produced images, in provider order.
    pub results: Vec<String>,
    pub error: Option<String>,
}

impl Job {
    /// Create a freshly submitted job in the `queued` state.
    pub fn new_queued(
        job_id: JobId,
        prompt: impl Into<String>,
        requested_count: u32,
        config_name: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            prompt: prompt.into(),
            requested_count,
            config_name: config_name.into(),
            created_at,
            started_at: None,
            finished_at: None,
            results: Vec::new(),
            error: None,
        }
    }

    /// `queued -> running`.
    pub fn start(&mut self, at: Timestamp) -> Result<(), CoreError> {
        self.ensure_transition(JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        Ok(())
    }

    /// `running -> succeeded`. An empty result list is not a success.
    pub fn succeed(&mut self, results: Vec<String>, at: Timestamp) -> Result<(), CoreError> {
        self.ensure_transition(JobStatus::Succeeded)?;
        if results.is_empty() {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot succeed without results",
                self.job_id
            )));
        }
        self.status = JobStatus::Succeeded;
        self.results = results;
        self.finished_at = Some(at);
        Ok(())
    }

    /// `running -> failed`.
    pub fn fail(&mut self, error: impl Into<String>, at: Timestamp) -> Result<(), CoreError> {
        self.ensure_transition(JobStatus::Failed)?;
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "Unknown error".to_string();
        }
        self.status = JobStatus::Failed;
        self.results.clear();
        self.error = Some(error);
        self.finished_at = Some(at);
        Ok(())
    }

    /// Verify the record-level invariants for the current status.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let violation = |what: &str| {
            Err(CoreError::Internal(format!(
                "Job {} ({}) violates invariant: {what}",
                self.job_id, self.status
            )))
        };

        if self.started_at.is_some() != (self.status != JobStatus::Queued) {
            return violation("started_at must be set iff the job left queued");
        }
        if self.finished_at.is_some() != self.status.is_terminal() {
            return violation("finished_at must be set iff the job is terminal");
        }
        match self.status {
            JobStatus::Queued | JobStatus::Running => {
                if !self.results.is_empty() || self.error.is_some() {
                    return violation("non-terminal job carries results or error");
                }
            }
            JobStatus::Succeeded => {
                if self.results.is_empty() || self.error.is_some() {
                    return violation("succeeded job needs results and no error");
                }
            }
            JobStatus::Failed => {
                if !self.results.is_empty() || self.error.as_deref().map_or(true, str::is_empty) {
                    return violation("failed job needs an error and no results");
                }
            }
        }
        Ok(())
    }

    fn ensure_transition(&self, next: JobStatus) -> Result<(), CoreError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {next}",
                self.job_id, self.status
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// PendingJob
// ---------------------------------------------------------------------------

/// A queued job together with the inputs only the executor needs.
///
/// The reference image is kept out of [`Job`] so that queries and events do
/// not ship the (potentially large) image payload.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub job: Job,
    pub reference_image: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
