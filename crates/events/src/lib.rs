//! Job update fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: a committed status change carrying the full job record.
//! - [`JobSubscription`]: one subscriber's ordered, lag-tolerant stream.
//! - [`UpdateMessage`]: the JSON envelope pushed to WebSocket viewers.

pub mod bus;
pub mod message;
pub mod subscription;

pub use bus::{EventBus, JobEvent};
pub use message::UpdateMessage;
pub use subscription::JobSubscription;
