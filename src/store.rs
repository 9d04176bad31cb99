//! # Persistent State Store
//!
//! Durable record of the single playback-state snapshot, stored as a JSON
//! file in the data directory. Written after every accepted transition so a
//! restart resumes at the last position.
//!
//! A write failure never blocks a transition: the in-memory state still
//! advances and broadcasts, the failure is logged, and the durable record
//! catches up on the next successful write. At most the last transition can
//! be lost across a crash.

use crate::model::PlaybackState;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// The filename for the playback-state snapshot.
const STATE_FILENAME: &str = "state.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode state JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed store for the playback-state snapshot.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATE_FILENAME),
        }
    }

    /// Loads the last persisted snapshot.
    ///
    /// A missing or corrupt file yields `None` with a logged warning; the
    /// caller falls back to the default state rather than failing startup.
    pub fn load(&self) -> Option<PlaybackState> {
        if !self.path.exists() {
            return None;
        }

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to open state file: {e}");
                return None;
            }
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("failed to parse state file, starting fresh: {e}");
                None
            }
        }
    }

    /// Overwrites the snapshot file with the given state.
    pub fn save(&self, state: &PlaybackState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state)?;
        Ok(())
    }
}
