//! # Session Actor
//!
//! The single logical owner of the playback state and the catalog. All
//! mutations funnel through one mpsc mailbox and are applied one at a time,
//! so actions are totally ordered and no observer can ever see a partially
//! applied transition.
//!
//! ## Data Flow
//!
//! ```text
//! [HTTP / WebSocket ingress] --> mpsc::Sender<Envelope> --> [Session Actor]
//!                                                                 |
//!                                     apply / persist / project   |
//!                                                                 v
//!                      watch::Sender<ViewPayload>   (latest, join snapshot)
//!                      broadcast::Sender<ServerEvent> (every transition)
//! ```
//!
//! The watch channel always holds the latest projection; a newly connected
//! observer reads it once for a full snapshot. The broadcast channel carries
//! every accepted transition in submission order, plus the ephemeral signals
//! that bypass the state machine.

use crate::catalog::{Catalog, CatalogError};
use crate::engine::{self, Action, Outcome};
use crate::model::{PerformerSettingsPatch, PlaybackState, Song};
use crate::projector::{self, ViewPayload};
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Mailbox depth. Actions are small and processed synchronously over
/// in-memory state, so a shallow queue is plenty of slack for bursts.
const MAILBOX_CAPACITY: usize = 64;

/// Broadcast buffer per observer. A lagging observer that falls further
/// behind than this misses intermediate payloads but stays monotonic.
const EVENT_CAPACITY: usize = 64;

/// One outbound event on an observer's socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A full projected snapshot after an accepted transition.
    State(ViewPayload),
    /// Ephemeral display hint for audience-type observers; relayed
    /// verbatim, never stored.
    AudienceDisplayMode { mode: String },
}

/// Request to the actor, paired with a oneshot ack where a reply matters.
enum Envelope {
    Action {
        action: Action,
        ack: oneshot::Sender<Outcome>,
    },
    UpdateSettings {
        patch: PerformerSettingsPatch,
    },
    SaveSong {
        song: Song,
        ack: oneshot::Sender<Result<Song, CatalogError>>,
    },
    DeleteSong {
        id: String,
        ack: oneshot::Sender<Result<bool, CatalogError>>,
    },
    ListSongs {
        ack: oneshot::Sender<Vec<Song>>,
    },
}

/// The actor stopped processing, which only happens at shutdown.
#[derive(Debug, Error)]
#[error("session actor is no longer running")]
pub struct SessionClosed;

/// Cheap-to-clone handle used by every request handler and socket task.
#[derive(Clone)]
pub struct SessionHandle {
    mailbox: mpsc::Sender<Envelope>,
    snapshot_rx: watch::Receiver<ViewPayload>,
    events_tx: broadcast::Sender<ServerEvent>,
}

impl SessionHandle {
    /// Submits one playback action and waits for its acknowledgment.
    pub async fn submit(&self, action: Action) -> Result<Outcome, SessionClosed> {
        let (ack, rx) = oneshot::channel();
        self.mailbox
            .send(Envelope::Action { action, ack })
            .await
            .map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Applies a performer-settings partial update. Accepted from a distinct
    /// channel than playback actions, but persists and broadcasts like any
    /// other transition.
    pub async fn update_settings(
        &self,
        patch: PerformerSettingsPatch,
    ) -> Result<(), SessionClosed> {
        self.mailbox
            .send(Envelope::UpdateSettings { patch })
            .await
            .map_err(|_| SessionClosed)
    }

    /// Upserts a song into the library.
    pub async fn save_song(&self, song: Song) -> Result<Result<Song, CatalogError>, SessionClosed> {
        let (ack, rx) = oneshot::channel();
        self.mailbox
            .send(Envelope::SaveSong { song, ack })
            .await
            .map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Deletes a library song by id. Ok(false) means the id was unknown.
    pub async fn delete_song(
        &self,
        id: String,
    ) -> Result<Result<bool, CatalogError>, SessionClosed> {
        let (ack, rx) = oneshot::channel();
        self.mailbox
            .send(Envelope::DeleteSong { id, ack })
            .await
            .map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Full song list in rotation order.
    pub async fn list_songs(&self) -> Result<Vec<Song>, SessionClosed> {
        let (ack, rx) = oneshot::channel();
        self.mailbox
            .send(Envelope::ListSongs { ack })
            .await
            .map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// The latest projected snapshot, for join pushes and `GET /api/state`.
    pub fn snapshot(&self) -> ViewPayload {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribes to the per-transition event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Relays an ephemeral signal to all observers, bypassing the state
    /// machine. Delivery failure just means nobody is listening.
    pub fn relay(&self, event: ServerEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// Loads the persisted state, clamps it against the catalog, and spawns the
/// actor task. The returned handle is the only way in.
pub fn spawn(catalog: Catalog, store: StateStore) -> SessionHandle {
    let mut state = store.load().unwrap_or_default();
    engine::clamp(&mut state, &catalog);

    let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(projector::project(&state, &catalog));
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let actor = SessionActor {
        state,
        catalog,
        store,
        snapshot_tx,
        events_tx: events_tx.clone(),
    };
    tokio::spawn(actor.run(mailbox_rx));

    SessionHandle {
        mailbox: mailbox_tx,
        snapshot_rx,
        events_tx,
    }
}

struct SessionActor {
    state: PlaybackState,
    catalog: Catalog,
    store: StateStore,
    snapshot_tx: watch::Sender<ViewPayload>,
    events_tx: broadcast::Sender<ServerEvent>,
}

impl SessionActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = mailbox.recv().await {
            match envelope {
                Envelope::Action { action, ack } => {
                    let outcome = engine::apply(&mut self.state, &self.catalog, action);
                    if outcome == Outcome::Applied {
                        self.persist_and_publish();
                    } else {
                        debug!("action was a no-op, skipping persist and broadcast");
                    }
                    let _ = ack.send(outcome);
                }
                Envelope::UpdateSettings { patch } => {
                    if self.state.performer_settings.apply_patch(patch) {
                        self.persist_and_publish();
                    }
                }
                Envelope::SaveSong { song, ack } => {
                    let result = self.catalog.save_song(song);
                    if result.is_ok() {
                        self.reclamp_and_publish();
                    }
                    let _ = ack.send(result);
                }
                Envelope::DeleteSong { id, ack } => {
                    let result = self.catalog.delete_song(&id);
                    if matches!(result, Ok(true)) {
                        self.reclamp_and_publish();
                    }
                    let _ = ack.send(result);
                }
                Envelope::ListSongs { ack } => {
                    let songs = self.catalog.list().into_iter().cloned().collect();
                    let _ = ack.send(songs);
                }
            }
        }
    }

    /// Persists the new state and pushes the projection to all observers.
    /// A persistence failure never blocks the broadcast; the durable record
    /// catches up on the next successful write.
    fn persist_and_publish(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!("failed to persist playback state: {e}");
        }
        self.publish();
    }

    /// After a library mutation the active song may have changed shape or
    /// vanished. Re-clamp, persist if the position moved, and re-broadcast
    /// so observers immediately see the resolved view.
    fn reclamp_and_publish(&mut self) {
        let before = self.state.clone();
        engine::clamp(&mut self.state, &self.catalog);
        if self.state != before {
            if let Err(e) = self.store.save(&self.state) {
                warn!("failed to persist playback state: {e}");
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let payload = projector::project(&self.state, &self.catalog);
        let _ = self.snapshot_tx.send(payload.clone());
        let _ = self.events_tx.send(ServerEvent::State(payload));
    }
}
