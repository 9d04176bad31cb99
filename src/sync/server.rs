//! # Cue Web Server
//!
//! Axum server exposing the session to browser clients.
//!
//! ## Endpoints
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /api/state` | Current projected snapshot |
//! | `POST /api/control` | Submit one playback action |
//! | `GET /api/setlists` | All songs in rotation order |
//! | `POST /api/library/save` | Validated library upsert |
//! | `DELETE /api/library/{id}` | Library delete by id |
//! | `GET /ws` | Observer WebSocket (snapshot + live updates) |
//!
//! Static files for the browser clients are served from the configured
//! public directory.
//!
//! ## Network Binding
//!
//! The server binds to `0.0.0.0` so phones and displays on the local
//! network can join the session directly.

use crate::engine::Action;
use crate::model::{PerformerSettingsPatch, Song};
use crate::session::{ServerEvent, SessionHandle};
use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;
use tracing::{debug, info};

/// Starts the hub server and runs until the process is shut down.
///
/// # Arguments
///
/// * `session` - Handle to the session actor; cloned into every handler.
/// * `port` - TCP port to bind on all interfaces.
/// * `public_dir` - Directory of static client files.
pub async fn start_server(
    session: SessionHandle,
    port: u16,
    public_dir: PathBuf,
) -> anyhow::Result<()> {
    let app = router(session).fallback_service(ServeDir::new(public_dir));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("cue server listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .context("cue server terminated unexpectedly")
}

/// Builds the API router. Split from [`start_server`] so the endpoints can
/// be exercised against an ephemeral listener or without binding at all.
pub fn router(session: SessionHandle) -> Router {
    Router::new()
        .route("/api/state", get(handle_state))
        .route("/api/control", post(handle_control))
        .route("/api/setlists", get(handle_setlists))
        .route("/api/library/save", post(handle_library_save))
        .route("/api/library/{id}", delete(handle_library_delete))
        .route("/ws", get(handle_websocket))
        .with_state(session)
}

/// `GET /api/state`: the latest projected snapshot.
async fn handle_state(State(session): State<SessionHandle>) -> Response {
    Json(session.snapshot()).into_response()
}

/// `POST /api/control`: one action in either wire shape (bare verb string
/// or `{type, ...}` object). Malformed payloads get a 400 with the reason.
async fn handle_control(
    State(session): State<SessionHandle>,
    Json(body): Json<Value>,
) -> Response {
    let action = match Action::parse_wire(&body) {
        Ok(action) => action,
        Err(e) => return bad_request(e.to_string()),
    };

    match session.submit(action).await {
        Ok(outcome) => Json(json!({
            "ok": true,
            "applied": outcome == crate::engine::Outcome::Applied,
        }))
        .into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// `GET /api/setlists`: all songs, setlist then library, in rotation order.
async fn handle_setlists(State(session): State<SessionHandle>) -> Response {
    match session.list_songs().await {
        Ok(songs) => Json(songs).into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[derive(Deserialize)]
struct SaveRequest {
    song: Song,
}

/// `POST /api/library/save`: validated upsert. Rejections carry the reason.
async fn handle_library_save(
    State(session): State<SessionHandle>,
    Json(body): Json<SaveRequest>,
) -> Response {
    match session.save_song(body.song).await {
        Ok(Ok(saved)) => Json(saved).into_response(),
        Ok(Err(e)) => bad_request(e.to_string()),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// `DELETE /api/library/{id}`: removes a library song; unknown ids report
/// `removed: false` rather than failing.
async fn handle_library_delete(
    State(session): State<SessionHandle>,
    Path(id): Path<String>,
) -> Response {
    match session.delete_song(id).await {
        Ok(Ok(removed)) => Json(json!({ "ok": true, "removed": removed })).into_response(),
        Ok(Err(e)) => bad_request(e.to_string()),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

fn bad_request(reason: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
}

/// The join sequence for a new observer: subscribe to the event stream,
/// then read the snapshot. In that order a transition committed mid-join is
/// either already in the snapshot or still queued on the subscription; the
/// watch channel only moves forward, so the snapshot can never be older
/// than an event the subscription missed.
fn observer_join(
    session: &SessionHandle,
) -> (
    tokio::sync::broadcast::Receiver<ServerEvent>,
    ServerEvent,
) {
    let events = session.subscribe();
    let snapshot = ServerEvent::State(session.snapshot());
    (events, snapshot)
}

/// Inbound WebSocket message from an observer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    /// A playback action, in either wire shape.
    Action { action: Value },
    /// Partial performer-settings update. Mutates state through the
    /// session's dedicated channel, so it persists and broadcasts.
    PerformerSettingsUpdate {
        gestures: Option<bool>,
        voice: Option<bool>,
    },
    /// Display hint for audience observers; relayed verbatim.
    AudienceDisplayMode { mode: String },
}

/// Handles WebSocket upgrade requests to `/ws`.
async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(session): State<SessionHandle>,
) -> Response {
    ws.on_upgrade(move |socket| handle_observer_socket(socket, session))
}

/// Manages one observer connection.
///
/// On connect:
/// 1. Sends one full `state` snapshot, so a late joiner is consistent
///    without history replay.
/// 2. Forwards every broadcast event until the client disconnects.
async fn handle_observer_socket(mut socket: WebSocket, session: SessionHandle) {
    let (mut events, snapshot) = observer_join(&session);
    if let Ok(text) = serde_json::to_string(&snapshot) {
        if socket.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        // Too slow for the buffer: resynchronize with the
                        // latest snapshot instead of replaying history.
                        debug!("observer lagged by {missed} events, resyncing");
                        ServerEvent::State(session.snapshot())
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Ok(text) = serde_json::to_string(&event) {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break; // Client disconnected
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&session, &text).await {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ignore pings and binary frames
                }
            }
        }
    }
}

/// Processes one inbound observer message. Returns an error reply for the
/// sending socket only; valid messages are acknowledged by the broadcast
/// itself.
async fn handle_client_message(session: &SessionHandle, text: &str) -> Option<String> {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    match parsed {
        Ok(ClientMessage::Action { action }) => match Action::parse_wire(&action) {
            Ok(action) => {
                let _ = session.submit(action).await;
                None
            }
            Err(e) => error_reply(e.to_string()),
        },
        Ok(ClientMessage::PerformerSettingsUpdate { gestures, voice }) => {
            let patch = PerformerSettingsPatch { gestures, voice };
            let _ = session.update_settings(patch).await;
            None
        }
        Ok(ClientMessage::AudienceDisplayMode { mode }) => {
            session.relay(ServerEvent::AudienceDisplayMode { mode });
            None
        }
        Err(e) => error_reply(format!("invalid message: {e}")),
    }
}

fn error_reply(message: String) -> Option<String> {
    serde_json::to_string(&json!({ "type": "error", "message": message })).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::Section;
    use crate::session;
    use crate::store::StateStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(dir: &std::path::Path) -> Router {
        let catalog = Catalog::from_songs(vec![Song {
            id: "a".into(),
            title: "Song A".into(),
            artist: "Artist".into(),
            sections: vec![Section {
                label: "Verse 1".into(),
                content: "line1\nline2".into(),
                background: None,
            }],
        }]);
        router(session::spawn(catalog, StateStore::new(dir)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn state_endpoint_returns_the_current_snapshot() {
        let dir = TempDir::new().unwrap();
        let app = test_router(dir.path());

        let response = app
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["currentSongId"], "a");
        assert_eq!(json["lyricLine"], "line1");
    }

    #[tokio::test]
    async fn control_accepts_bare_verbs_and_reports_applied() {
        let dir = TempDir::new().unwrap();
        let app = test_router(dir.path());

        let response = app
            .oneshot(
                Request::post("/api/control")
                    .header("content-type", "application/json")
                    .body(Body::from(r#""NEXT_LINE_OR_SECTION""#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["applied"], true);
    }

    #[tokio::test]
    async fn control_rejects_unknown_verbs_with_a_reason() {
        let dir = TempDir::new().unwrap();
        let app = test_router(dir.path());

        let response = app
            .oneshot(
                Request::post("/api/control")
                    .header("content-type", "application/json")
                    .body(Body::from(r#""JAZZ_HANDS""#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("JAZZ_HANDS"));
    }

    #[tokio::test]
    async fn setlists_endpoint_lists_full_songs() {
        let dir = TempDir::new().unwrap();
        let app = test_router(dir.path());

        let response = app
            .oneshot(Request::get("/api/setlists").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["id"], "a");
        assert_eq!(json[0]["sections"][0]["label"], "Verse 1");
    }

    #[tokio::test]
    async fn transition_between_join_steps_is_never_lost() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::from_songs(vec![Song {
            id: "a".into(),
            title: "Song A".into(),
            artist: "Artist".into(),
            sections: vec![Section {
                label: "Verse 1".into(),
                content: "line1\nline2".into(),
                background: None,
            }],
        }]);
        let session = session::spawn(catalog, StateStore::new(dir.path()));

        // Worst-case interleaving for a joining observer: a transition
        // commits between the two steps of the join sequence. With
        // subscribe-first ordering the joiner converges either way.
        let mut events = session.subscribe();
        session
            .submit(crate::engine::Action::NextLineOrSection)
            .await
            .unwrap();
        let snapshot = session.snapshot();

        // The snapshot already reflects the transition...
        assert_eq!(snapshot.current_line_index, 1);
        assert_eq!(snapshot.lyric_line, "line2");
        // ...and the subscription still carries the event, so the joiner
        // never renders a state older than what other observers saw.
        match events.try_recv().unwrap() {
            ServerEvent::State(payload) => assert_eq!(payload.current_line_index, 1),
            other => panic!("expected state event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn library_save_validates_and_delete_reports_removal() {
        let dir = TempDir::new().unwrap();
        let app = test_router(dir.path());

        // Missing title is rejected with a descriptive reason.
        let bad = json!({ "song": {
            "id": "", "title": " ", "artist": "X",
            "sections": [{ "label": "Verse 1", "content": "a" }]
        }});
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/library/save")
                    .header("content-type", "application/json")
                    .body(Body::from(bad.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown delete is a no-op, not an error.
        let response = app
            .oneshot(
                Request::delete("/api/library/nothing-here")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["removed"], false);
    }
}
