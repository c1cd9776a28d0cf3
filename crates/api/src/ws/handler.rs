use std::time::Duration;

use aigpic_events::{JobSubscription, UpdateMessage};
use aigpic_pipeline::DEFAULT_SNAPSHOT_LIMIT;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::state::AppState;
use crate::ws::viewers::ViewerSeat;

/// Interval between keep-alive pings on an idle feed.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET /ws/tasks -- upgrade to the live job feed.
///
/// The client first receives an `initial_tasks` snapshot of the most recent
/// jobs, then one `task_update` per committed status change.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single feed connection after upgrade.
///
/// Subscribes before the snapshot is read, then spawns a sender task that
/// writes the snapshot and forwards updates and pings. The current task
/// drains inbound frames until the client leaves.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let feed = match state.orchestrator.subscribe(DEFAULT_SNAPSHOT_LIMIT).await {
        Ok(feed) => feed,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load job snapshot");
            return;
        }
    };

    let seat = state.viewers.join().await;
    let viewer_id = seat.id;
    tracing::info!(%viewer_id, snapshot = feed.snapshot.len(), "Feed viewer connected");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        let initial = UpdateMessage::InitialTasks {
            tasks: feed.snapshot,
        };
        if send_update(&mut sink, &initial).await {
            forward(&mut sink, feed.updates, &seat).await;
        }
        tracing::debug!(viewer_id = %seat.id, "Feed sender finished");
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(%viewer_id, "Pong received");
            }
            Ok(Message::Text(text)) => {
                tracing::debug!(%viewer_id, message = %text.as_str(), "Ignoring client message");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%viewer_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.viewers.leave(viewer_id).await;
    send_task.abort();
    tracing::info!(%viewer_id, "Feed viewer disconnected");
}

/// Forward job updates, with periodic pings, until the feed is closed or
/// the client is gone.
async fn forward(
    sink: &mut SplitSink<WebSocket, Message>,
    mut updates: JobSubscription,
    seat: &ViewerSeat,
) {
    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = seat.closing.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            event = updates.recv() => {
                let Some(event) = event else { break };
                seat.record_missed(updates.missed());
                let update = UpdateMessage::TaskUpdate { task: event.job };
                if !send_update(sink, &update).await {
                    break;
                }
            }
        }
    }
}

/// Serialize and send one update. Returns `false` once the sink is gone.
async fn send_update(sink: &mut SplitSink<WebSocket, Message>, update: &UpdateMessage) -> bool {
    let text = match update.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize job update");
            return true;
        }
    };
    sink.send(Message::Text(text.into())).await.is_ok()
}
