//! Push channel: state changes as server-sent events.
//!
//! Every stream opens with a `snapshot` event carrying the current
//! [`Snapshot`](crate::api_client::types::Snapshot), followed by each
//! [`Event`] under its own name.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::broadcast::Event;
use crate::tracing::prelude::*;

pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new().routes(routes!(event_stream))
}

/// Subscribe to state changes.
#[utoipa::path(
    get,
    path = "/events",
    tag = "status",
    responses(
        (status = OK, description = "Snapshot, then one event per state change",
         content_type = "text/event-stream", body = Event),
    ),
)]
async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (snapshot, rx) = state.broadcaster.subscribe();
    debug!(subscribers = state.broadcaster.subscriber_count(), "Push subscriber joined");

    let first = stream::once(async move { encode("snapshot", &snapshot) });
    let updates = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(event) => Some(encode(event.name(), &event)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Push subscriber lagging, events dropped");
                None
            }
        }
    });

    let stream = first
        .chain(updates)
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(Ok);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn encode<T: serde::Serialize>(name: &str, data: &T) -> SseEvent {
    let event = SseEvent::default().event(name);
    match serde_json::to_string(data) {
        Ok(json) => event.data(json),
        Err(e) => {
            error!(event = name, error = %e, "Failed to encode push event");
            event.data("{}")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::api::{ApiState, router};
    use crate::broadcast::{Event, EventBroadcaster};
    use crate::store::AlarmStore;

    #[tokio::test]
    async fn stream_starts_with_snapshot_then_events() {
        let broadcaster = Arc::new(EventBroadcaster::new());
        broadcaster.publish(Event::CubeConnected { connected: true });
        let (machine_tx, _machine_rx) = mpsc::channel(1);
        let (cube_cmd_tx, _cube_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let state = Arc::new(ApiState {
            store: Arc::new(AlarmStore::in_memory()),
            broadcaster: broadcaster.clone(),
            machine_tx,
            cube_cmd_tx,
            shutdown: shutdown.clone(),
            started: Instant::now(),
        });

        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let mut body = response.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.starts_with("event: snapshot\n"), "{first}");
        assert!(first.contains(r#""connected":true"#), "{first}");

        broadcaster.publish(Event::CubeSolved);
        let next = body.frame().await.unwrap().unwrap().into_data().unwrap();
        let next = String::from_utf8(next.to_vec()).unwrap();
        assert!(next.starts_with("event: cube_solved\n"), "{next}");

        // Shutdown ends the stream.
        shutdown.cancel();
        assert!(body.frame().await.is_none());
    }
}
