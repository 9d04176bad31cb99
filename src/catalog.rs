//! # Catalog Store
//!
//! Holds the pre-authored setlist plus the user-curated library of songs and
//! persists the library as a JSON file in the data directory.
//!
//! ## Data Files
//!
//! - `setlist.json`: optional pre-authored catalog, read-only at runtime.
//! - `library.json`: user library, rewritten in full after every mutation.
//!
//! ## Uniqueness
//!
//! The song `id` serves as the primary key across setlist and library.
//! Saving a song whose id already exists in the library updates the existing
//! entry (upsert). Rotation order is the concatenation order
//! setlist-then-library as currently loaded.

use crate::model::{Section, Song};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// The filename for the user library within the data directory.
const LIBRARY_FILENAME: &str = "library.json";

/// The filename for the optional pre-authored setlist.
const SETLIST_FILENAME: &str = "setlist.json";

/// Errors surfaced at the library mutation boundary.
///
/// Validation failures are reported back to the submitting client with a
/// descriptive reason; I/O failures mean the library file could not be
/// rewritten.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid song: {0}")]
    InvalidSong(String),
    #[error("failed to write library file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode library JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The catalog: fixed setlist plus mutable, persisted library.
///
/// Single-writer by construction: the session actor owns the only instance,
/// so library mutation can never race a playback transition.
pub struct Catalog {
    setlist: Vec<Song>,
    library: Vec<Song>,
    library_path: PathBuf,
}

impl Catalog {
    /// Loads the catalog from the data directory.
    ///
    /// A missing or corrupt file yields an empty list with a logged warning
    /// rather than an error; playback must keep functioning regardless. If
    /// both setlist and library come up empty, a small built-in demo setlist
    /// is seeded so the machine always has at least one song to resolve.
    pub fn load(data_dir: &Path) -> Self {
        let setlist = read_songs(&data_dir.join(SETLIST_FILENAME));
        let library = read_songs(&data_dir.join(LIBRARY_FILENAME));

        let mut catalog = Self {
            setlist,
            library,
            library_path: data_dir.join(LIBRARY_FILENAME),
        };

        if catalog.setlist.is_empty() && catalog.library.is_empty() {
            catalog.library = demo_setlist();
            if let Err(e) = catalog.persist_library() {
                warn!("failed to persist seeded demo setlist: {e}");
            }
        }

        catalog
    }

    /// Builds an in-memory catalog from a fixed song list. Test seam; the
    /// library file is never written because there is no library.
    #[cfg(test)]
    pub fn from_songs(setlist: Vec<Song>) -> Self {
        Self {
            setlist,
            library: Vec::new(),
            library_path: PathBuf::new(),
        }
    }

    /// All songs in rotation order: setlist first, then library.
    pub fn list(&self) -> Vec<&Song> {
        self.setlist.iter().chain(self.library.iter()).collect()
    }

    /// Looks up a song by id across setlist and library.
    pub fn find_by_id(&self, id: &str) -> Option<&Song> {
        self.setlist
            .iter()
            .chain(self.library.iter())
            .find(|s| s.id == id)
    }

    /// True when no songs are loaded at all.
    pub fn is_empty(&self) -> bool {
        self.setlist.is_empty() && self.library.is_empty()
    }

    /// The id of the song following `current` in rotation order, wrapping
    /// from the last song back to the first. If `current` is unset or not
    /// found, rotation starts from the first entry.
    pub fn next_song_id(&self, current: Option<&str>) -> Option<String> {
        let songs = self.list();
        if songs.is_empty() {
            return None;
        }
        let next = match current.and_then(|id| songs.iter().position(|s| s.id == id)) {
            Some(pos) => (pos + 1) % songs.len(),
            None => 0,
        };
        Some(songs[next].id.clone())
    }

    /// Adds a song to the library or updates an existing one (upsert by id).
    ///
    /// A song submitted without an id gets one derived from its title and
    /// artist. Validation failures are rejected with a descriptive reason at
    /// this boundary, not silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidSong`] for malformed songs, or an I/O
    /// variant if the library file cannot be rewritten.
    pub fn save_song(&mut self, mut song: Song) -> Result<Song, CatalogError> {
        if song.title.trim().is_empty() {
            return Err(CatalogError::InvalidSong("title must not be empty".into()));
        }
        if song.sections.is_empty() {
            return Err(CatalogError::InvalidSong(
                "song must have at least one section".into(),
            ));
        }
        if song.id.trim().is_empty() {
            song.id = normalize_id(&song.title, &song.artist);
        }

        if let Some(existing) = self.library.iter_mut().find(|s| s.id == song.id) {
            *existing = song.clone();
        } else {
            self.library.push(song.clone());
        }

        self.persist_library()?;
        Ok(song)
    }

    /// Removes a library song by id. Returns true if something was removed;
    /// an unknown id is a no-op and the file is not rewritten.
    pub fn delete_song(&mut self, id: &str) -> Result<bool, CatalogError> {
        let original_len = self.library.len();
        self.library.retain(|s| s.id != id);

        if self.library.len() < original_len {
            self.persist_library()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Rewrites the library file in full.
    fn persist_library(&self) -> Result<(), CatalogError> {
        if let Some(parent) = self.library_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.library_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.library)?;
        Ok(())
    }
}

/// Reads a JSON array of songs, returning an empty list on any failure.
fn read_songs(path: &Path) -> Vec<Song> {
    if !path.exists() {
        return Vec::new();
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to open {}: {e}", path.display());
            return Vec::new();
        }
    };

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(songs) => songs,
        Err(e) => {
            warn!("failed to parse {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// Derives a stable song id from title and artist: lowercased, with every
/// non-alphanumeric character replaced by `-`.
pub fn normalize_id(title: &str, artist: &str) -> String {
    format!("{title}-{artist}")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Static fallback setlist seeded on first run with no data files.
fn demo_setlist() -> Vec<Song> {
    let entries = [
        ("Hillsong Worship", "Amazing Grace"),
        ("Chris Tomlin", "How Great Is Our God"),
        ("Bethel Music", "Goodness of God"),
        ("Elevation Worship", "O Come to the Altar"),
        ("Kari Jobe", "The Blessing"),
    ];

    entries
        .iter()
        .map(|(artist, title)| Song {
            id: normalize_id(title, artist),
            title: title.to_string(),
            artist: artist.to_string(),
            sections: vec![
                Section {
                    label: "Verse 1".into(),
                    content: format!(
                        "{title} lyrics would appear here\nThis is a demo placeholder\nReplace this song from the library"
                    ),
                    background: None,
                },
                Section {
                    label: "Chorus".into(),
                    content: format!("{title} chorus\nSing along with the melody\nPraise and worship together"),
                    background: None,
                },
            ],
        })
        .collect()
}
