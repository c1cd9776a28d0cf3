//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&SqlitePool` as the first argument.

pub mod image_repo;
pub mod job_repo;

pub use image_repo::ImageRepo;
pub use job_repo::JobRepo;
