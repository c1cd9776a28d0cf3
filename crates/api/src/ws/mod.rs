//! The live job feed at `/ws/tasks`.

mod handler;
pub mod viewers;

pub use handler::ws_handler;
pub use viewers::{FeedViewers, ViewerStats};
