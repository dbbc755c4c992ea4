use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{TrackerError, TrackerResult};
use crate::metrics::MetricsSnapshot;
use crate::tracker::WorkoutTracker;
use crate::types::RoutePoint;

pub fn router(tracker: WorkoutTracker) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/route", get(route_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(tracker)
}

/// Serve the dashboard until the process exits.
pub async fn start_dashboard(tracker: WorkoutTracker, port: u16) -> TrackerResult<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| TrackerError::Dashboard(format!("bind {addr}: {e}")))?;
    info!("[DASHBOARD] listening on http://{}", addr);
    axum::serve(listener, router(tracker))
        .await
        .map_err(|e| TrackerError::Dashboard(e.to_string()))
}

async fn status_handler(State(tracker): State<WorkoutTracker>) -> Json<MetricsSnapshot> {
    Json(tracker.snapshot())
}

async fn route_handler(State(tracker): State<WorkoutTracker>) -> Json<Vec<RoutePoint>> {
    Json(tracker.route())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(tracker): State<WorkoutTracker>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, tracker))
}

/// Push every published snapshot to the client until either side hangs up.
async fn handle_socket(socket: WebSocket, tracker: WorkoutTracker) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = tracker.subscribe();

    loop {
        let json = {
            let snapshot = updates.borrow_and_update();
            match serde_json::to_string(&*snapshot) {
                Ok(json) => json,
                Err(e) => {
                    debug!("[DASHBOARD] snapshot encode failed: {}", e);
                    break;
                }
            }
        };
        if sender.send(Message::Text(json)).await.is_err() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("[DASHBOARD] client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TrackerConfig;
    use crate::session::SessionPhase;
    use crate::types::LocationFix;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    fn tracker() -> WorkoutTracker {
        let tracker = WorkoutTracker::new(&TrackerConfig::default(), Arc::new(ManualClock::new(0)));
        tracker.start();
        tracker.ingest(LocationFix::new(59.3293, 18.0686, 5.0, 0));
        tracker
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let response = router(tracker())
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let snapshot: MetricsSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Tracking);
        assert_eq!(snapshot.route_points, 1);
        assert_eq!(snapshot.last_fix.unwrap().latitude, 59.3293);
    }

    #[tokio::test]
    async fn test_route_endpoint() {
        let response = router(tracker())
            .oneshot(Request::builder().uri("/api/route").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let route: Vec<RoutePoint> = serde_json::from_slice(&body).unwrap();
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].latitude, 59.3293);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let response = router(tracker())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    async fn next_snapshot(client: &mut Client) -> MetricsSnapshot {
        loop {
            let message = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no snapshot within 5 s")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_ws_pushes_updates() {
        let clock = ManualClock::new(0);
        let tracker = WorkoutTracker::new(&TrackerConfig::default(), Arc::new(clock.clone()));
        tracker.start();
        tracker.ingest(LocationFix::new(59.3293, 18.0686, 5.0, 0));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(tracker.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let first = next_snapshot(&mut client).await;
        assert_eq!(first.phase, SessionPhase::Tracking);
        assert_eq!(first.route_points, 1);

        clock.advance(60_000);
        tracker.ingest(LocationFix::new(59.3303, 18.0686, 5.0, 60_000));
        let second = next_snapshot(&mut client).await;
        assert_eq!(second.route_points, 2);
        assert_eq!(second.duration_ms, 60_000);
        assert!(second.distance_km > 0.1);

        client.close(None).await.unwrap();
    }
}
