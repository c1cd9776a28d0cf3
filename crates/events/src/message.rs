//! JSON envelope for live job updates.

use aigpic_core::job::Job;
use serde::{Deserialize, Serialize};

/// A message pushed to a live viewer.
///
/// Serialized with a `type` tag:
/// `{"type":"initial_tasks","tasks":[...]}` once on connect, then
/// `{"type":"task_update","task":{...}}` per committed change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    InitialTasks { tasks: Vec<Job> },
    TaskUpdate { task: Job },
}

impl UpdateMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
