//! A single subscriber's view of the event bus.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::bus::JobEvent;

/// Ordered stream of [`JobEvent`]s for one subscriber.
///
/// Events arrive in publish order. If the subscriber falls behind the bus
/// capacity, the oldest events are skipped and counted in [`missed`].
///
/// [`missed`]: JobSubscription::missed
pub struct JobSubscription {
    receiver: broadcast::Receiver<JobEvent>,
    missed: u64,
}

impl JobSubscription {
    pub(crate) fn new(receiver: broadcast::Receiver<JobEvent>) -> Self {
        Self {
            receiver,
            missed: 0,
        }
    }

    /// Wait for the next event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => {
                    self.missed += n;
                    tracing::warn!(
                        skipped = n,
                        total_missed = self.missed,
                        "Job subscriber lagged, oldest updates were dropped"
                    );
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Event bus closed, subscription ending");
                    return None;
                }
            }
        }
    }

    /// Total number of events this subscriber has lost to lag.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}
