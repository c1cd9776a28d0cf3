//! Domain types shared by every aigpic crate.
//!
//! Holds the [`job::Job`] record and its state machine, the pure submission
//! rules, and the provider configuration registry. Nothing in here performs
//! I/O beyond reading the provider configuration file.

pub mod error;
pub mod job;
pub mod providers;
pub mod submission;
pub mod types;
