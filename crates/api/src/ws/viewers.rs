//! Registry of clients watching the live job feed.
//!
//! Each `/ws/tasks` socket takes a [`ViewerSeat`] for its lifetime. The seat
//! reports how many updates the viewer lost to lag and carries the token the
//! server cancels to close every feed on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aigpic_core::types::Timestamp;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Viewer {
    connected_at: Timestamp,
    missed: Arc<AtomicU64>,
}

/// One viewer's hold on the registry, owned by its socket task.
pub struct ViewerSeat {
    pub id: Uuid,
    pub connected_at: Timestamp,
    /// Cancelled when the server closes all feeds.
    pub closing: CancellationToken,
    missed: Arc<AtomicU64>,
}

impl ViewerSeat {
    /// Record the viewer's running total of updates dropped for lag.
    pub fn record_missed(&self, total: u64) {
        self.missed.store(total, Ordering::Relaxed);
    }
}

/// Aggregate view of the connected viewers, reported on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerStats {
    pub viewers: usize,
    /// Updates dropped across all connected viewers.
    pub missed_updates: u64,
    pub oldest_connected_at: Option<Timestamp>,
}

pub struct FeedViewers {
    viewers: RwLock<HashMap<Uuid, Viewer>>,
    closing: CancellationToken,
}

impl FeedViewers {
    pub fn new() -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            closing: CancellationToken::new(),
        }
    }

    /// Register a new viewer.
    ///
    /// A seat taken after [`close_all`](Self::close_all) starts out closed.
    pub async fn join(&self) -> ViewerSeat {
        let seat = ViewerSeat {
            id: Uuid::new_v4(),
            connected_at: chrono::Utc::now(),
            closing: self.closing.child_token(),
            missed: Arc::new(AtomicU64::new(0)),
        };
        self.viewers.write().await.insert(
            seat.id,
            Viewer {
                connected_at: seat.connected_at,
                missed: Arc::clone(&seat.missed),
            },
        );
        seat
    }

    pub async fn leave(&self, id: Uuid) {
        if let Some(viewer) = self.viewers.write().await.remove(&id) {
            let connected_secs = (chrono::Utc::now() - viewer.connected_at).num_seconds();
            tracing::debug!(
                viewer_id = %id,
                connected_secs,
                missed = viewer.missed.load(Ordering::Relaxed),
                "Feed viewer left",
            );
        }
    }

    pub async fn stats(&self) -> ViewerStats {
        let viewers = self.viewers.read().await;
        ViewerStats {
            viewers: viewers.len(),
            missed_updates: viewers
                .values()
                .map(|v| v.missed.load(Ordering::Relaxed))
                .sum(),
            oldest_connected_at: viewers.values().map(|v| v.connected_at).min(),
        }
    }

    /// Signal every viewer to send a Close frame and stop. Returns how many
    /// viewers were connected.
    pub async fn close_all(&self) -> usize {
        let count = self.viewers.read().await.len();
        self.closing.cancel();
        tracing::info!(count, "Closing all feed viewers");
        count
    }
}

impl Default for FeedViewers {
    fn default() -> Self {
        Self::new()
    }
}
