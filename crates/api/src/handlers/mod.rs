//! Request handlers.
//!
//! Each submodule provides the async handler functions for one resource.
//! Handlers delegate to the orchestrator or the gallery repository and map
//! errors via [`AppError`](crate::error::AppError).

pub mod configs;
pub mod images;
pub mod tasks;
