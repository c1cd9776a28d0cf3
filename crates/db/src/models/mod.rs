//! Row structs for the `jobs` and `images` tables.

pub mod image;
pub mod job;
