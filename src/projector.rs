//! # View Projector
//!
//! Derives the flat, display-ready payload observers render from raw
//! playback state plus the catalog. Pure and deterministic: called after
//! every accepted transition and on demand for join snapshots, never stored.

use crate::catalog::Catalog;
use crate::model::{Background, PerformerSettings, PlaybackState, Song};
use serde::{Deserialize, Serialize};

/// Denormalized song header included for progress indicators. Raw catalog
/// internals beyond this are never exposed to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SongSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub section_count: usize,
}

/// The self-contained snapshot pushed to every observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewPayload {
    pub current_song_id: Option<String>,
    pub current_section_index: usize,
    pub current_line_index: usize,
    pub is_playing: bool,
    pub performer_settings: PerformerSettings,
    /// The line currently displayed.
    pub lyric_line: String,
    /// Lookahead: next line in the section, or the first line of the next
    /// section, or empty at song end.
    pub next_lyric_line: String,
    /// Effective background: the override if present, else the active
    /// section's background, else none.
    pub background: Background,
    pub song: Option<SongSummary>,
}

/// Projects state + catalog into a [`ViewPayload`].
///
/// The song id is resolved against the live catalog, falling back to the
/// first catalog entry when unset or dangling; indices are clamped rather
/// than trusted so a mid-mutation caller can never produce an out-of-bounds
/// read.
pub fn project(state: &PlaybackState, catalog: &Catalog) -> ViewPayload {
    let song = resolve_song(state, catalog);

    let Some(song) = song else {
        // Empty catalog: nothing to render beyond the raw flags.
        return ViewPayload {
            current_song_id: state.current_song_id.clone(),
            is_playing: state.is_playing,
            performer_settings: state.performer_settings,
            background: state
                .current_background_override
                .clone()
                .unwrap_or_default(),
            ..Default::default()
        };
    };

    let section_index = state
        .current_section_index
        .min(song.sections.len().saturating_sub(1));
    let section = song.sections.get(section_index);

    let lines = section.map(|s| s.lines()).unwrap_or_default();
    let line_index = state
        .current_line_index
        .min(lines.len().saturating_sub(1));
    let lyric_line = lines.get(line_index).copied().unwrap_or("").to_string();

    let next_lyric_line = if line_index + 1 < lines.len() {
        lines[line_index + 1].to_string()
    } else {
        song.sections
            .get(section_index + 1)
            .and_then(|next| next.lines().first().copied().map(str::to_string))
            .unwrap_or_default()
    };

    let background = state
        .current_background_override
        .clone()
        .or_else(|| section.and_then(|s| s.background.clone()))
        .unwrap_or_default();

    ViewPayload {
        current_song_id: Some(song.id.clone()),
        current_section_index: section_index,
        current_line_index: line_index,
        is_playing: state.is_playing,
        performer_settings: state.performer_settings,
        lyric_line,
        next_lyric_line,
        background,
        song: Some(SongSummary {
            id: song.id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            section_count: song.sections.len(),
        }),
    }
}

fn resolve_song<'a>(state: &PlaybackState, catalog: &'a Catalog) -> Option<&'a Song> {
    state
        .current_song_id
        .as_deref()
        .and_then(|id| catalog.find_by_id(id))
        .or_else(|| catalog.list().first().copied())
}
