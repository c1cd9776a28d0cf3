//! Image generation provider client.
//!
//! - [`GenerationClient`]: the seam the orchestrator calls, one attempt per job.
//! - [`ImagesApiClient`]: implementation for OpenAI-compatible
//!   `/v1/images/generations` endpoints.
//! - [`ProviderError`]: the failure taxonomy surfaced on failed jobs.

pub mod client;
pub mod error;
pub mod images_api;
pub mod response;

pub use client::{GenerationClient, GenerationRequest, ImagePayload};
pub use error::ProviderError;
pub use images_api::ImagesApiClient;
