//! Task orchestrator for image generation jobs.
//!
//! [`Orchestrator`] owns a FIFO ready queue and a fixed pool of workers.
//! Submissions are persisted as `queued` and return immediately; each worker
//! claims the oldest queued job, records it as `running`, calls the
//! [`GenerationClient`](aigpic_provider::GenerationClient) without holding
//! any shared lock, writes the images to the [`OutputStore`] and records the
//! terminal state. Every committed transition is published on the
//! [`EventBus`](aigpic_events::EventBus).

mod commit;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod retry;
mod worker;

pub use error::PipelineError;
pub use orchestrator::{
    JobFeed, Orchestrator, OrchestratorConfig, QueueStats, DEFAULT_SNAPSHOT_LIMIT, INTERRUPTED_ERROR,
};
pub use output::OutputStore;
pub use retry::RetryPolicy;
