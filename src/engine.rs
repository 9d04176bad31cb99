//! # Playback State Machine
//!
//! Owns the transition logic for the single authoritative [`PlaybackState`].
//! One entry point, [`apply`], validates an action against the current
//! catalog snapshot, transitions the state, and reports whether anything
//! changed. Actions that change nothing (boundary navigation, unknown song
//! ids, out-of-range section jumps) are no-ops: the caller is acknowledged
//! but nothing is persisted or broadcast.
//!
//! ## Navigation Model
//!
//! Two granularities share the cursor: line-within-section and whole
//! section. `NEXT_LINE_OR_SECTION` / `PREV_LINE_OR_SECTION` move line-first
//! and fall back to crossing a section boundary; the end of the song is a
//! hard boundary and never wraps to the next song. `PREV` across a boundary
//! lands on the previous section's *last* line, symmetric with forward
//! traversal. `NEXT_SONG` rotates through catalog order and wraps.
//!
//! ## Invariants
//!
//! After every call the state is clamped against the live catalog: a song id
//! that no longer resolves is substituted with the first catalog entry, and
//! section/line indices always point inside the resolved song. The machine
//! never caches a stale `Song` reference across transitions.

use crate::catalog::Catalog;
use crate::model::{Background, PlaybackState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The closed vocabulary of state-mutating actions.
///
/// Wire shape is either a bare verb string (`"NEXT_SONG"`) or a tagged
/// object (`{"type": "SELECT_SONG", "songId": "..."}`); anything outside
/// this union is rejected at the ingress boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    NextLineOrSection,
    PrevLineOrSection,
    NextSection,
    PrevSection,
    NextSong,
    Play,
    Pause,
    TogglePlay,
    SelectSong { song_id: String },
    GoToSection { index: usize },
    SetBackground { background: Background },
}

/// Rejection at the ingress boundary: malformed payload or unknown verb.
/// Never carries a partial state mutation.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action verb: {0}")]
    UnknownVerb(String),
    #[error("invalid action payload: {0}")]
    InvalidPayload(String),
}

impl Action {
    /// Parses an inbound action in either wire shape.
    pub fn parse_wire(value: &Value) -> Result<Action, ActionError> {
        match value {
            Value::String(verb) => Self::from_verb(verb),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| ActionError::InvalidPayload(e.to_string())),
            other => Err(ActionError::InvalidPayload(format!(
                "expected a verb string or tagged object, got {other}"
            ))),
        }
    }

    /// Parses a bare verb string. Parameterized commands must use the
    /// tagged-object shape.
    pub fn from_verb(verb: &str) -> Result<Action, ActionError> {
        match verb {
            "NEXT_LINE_OR_SECTION" => Ok(Action::NextLineOrSection),
            "PREV_LINE_OR_SECTION" => Ok(Action::PrevLineOrSection),
            "NEXT_SECTION" => Ok(Action::NextSection),
            "PREV_SECTION" => Ok(Action::PrevSection),
            "NEXT_SONG" => Ok(Action::NextSong),
            "PLAY" => Ok(Action::Play),
            "PAUSE" => Ok(Action::Pause),
            "TOGGLE_PLAY" => Ok(Action::TogglePlay),
            other => Err(ActionError::UnknownVerb(other.to_string())),
        }
    }
}

/// Whether a transition changed state. No-ops are acknowledged but trigger
/// neither persistence nor broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    NoOp,
}

/// Applies one action to the state, resolving song and indices against the
/// given catalog snapshot. Returns [`Outcome::Applied`] iff at least one
/// field changed (including a clamp repair of a dangling reference).
pub fn apply(state: &mut PlaybackState, catalog: &Catalog, action: Action) -> Outcome {
    let before = state.clone();

    clamp(state, catalog);

    match action {
        Action::NextLineOrSection => next_line_or_section(state, catalog),
        Action::PrevLineOrSection => prev_line_or_section(state, catalog),
        Action::NextSection => jump_section(state, catalog, 1),
        Action::PrevSection => jump_section(state, catalog, -1),
        Action::NextSong => {
            if let Some(next) = catalog.next_song_id(state.current_song_id.as_deref()) {
                state.current_song_id = Some(next);
                state.current_section_index = 0;
                state.current_line_index = 0;
            }
        }
        Action::SelectSong { song_id } => {
            // Unknown id is rejected as a no-op rather than degrading.
            if catalog.find_by_id(&song_id).is_some() {
                state.current_song_id = Some(song_id);
                state.current_section_index = 0;
                state.current_line_index = 0;
            }
        }
        Action::GoToSection { index } => {
            let section_count = resolved_section_count(state, catalog);
            if index < section_count {
                state.current_section_index = index;
                state.current_line_index = 0;
            }
        }
        Action::SetBackground { background } => {
            // A `none` background clears the override so projection falls
            // back to the section's own background.
            state.current_background_override = match background {
                Background::None => None,
                bg => Some(bg),
            };
        }
        Action::Play => state.is_playing = true,
        Action::Pause => state.is_playing = false,
        Action::TogglePlay => state.is_playing = !state.is_playing,
    }

    if *state == before {
        Outcome::NoOp
    } else {
        Outcome::Applied
    }
}

/// Re-resolves the state against the current catalog and repairs any
/// out-of-bounds reference: a dangling song id becomes the first catalog
/// entry, and the indices are clamped into the resolved song.
pub fn clamp(state: &mut PlaybackState, catalog: &Catalog) {
    if catalog.is_empty() {
        state.current_section_index = 0;
        state.current_line_index = 0;
        return;
    }

    let resolved = state
        .current_song_id
        .as_deref()
        .and_then(|id| catalog.find_by_id(id));
    let song = match resolved {
        Some(song) => song,
        None => {
            let first = catalog.list()[0];
            state.current_song_id = Some(first.id.clone());
            state.current_section_index = 0;
            state.current_line_index = 0;
            return;
        }
    };

    let section_count = song.sections.len();
    if section_count == 0 {
        state.current_section_index = 0;
        state.current_line_index = 0;
        return;
    }
    state.current_section_index = state.current_section_index.min(section_count - 1);

    let line_count = song.sections[state.current_section_index].line_count();
    state.current_line_index = state.current_line_index.min(line_count.saturating_sub(1));
}

fn next_line_or_section(state: &mut PlaybackState, catalog: &Catalog) {
    let Some(song) = resolved_song(state, catalog) else {
        return;
    };

    let line_count = song
        .sections
        .get(state.current_section_index)
        .map_or(0, |s| s.line_count());

    if state.current_line_index + 1 < line_count {
        state.current_line_index += 1;
    } else if state.current_section_index + 1 < song.sections.len() {
        state.current_section_index += 1;
        state.current_line_index = 0;
    }
    // End of song: hard boundary, no wrap to the next song.
}

fn prev_line_or_section(state: &mut PlaybackState, catalog: &Catalog) {
    let Some(song) = resolved_song(state, catalog) else {
        return;
    };

    if state.current_line_index > 0 {
        state.current_line_index -= 1;
    } else if state.current_section_index > 0 {
        state.current_section_index -= 1;
        // Land on the previous section's last line.
        let line_count = song.sections[state.current_section_index].line_count();
        state.current_line_index = line_count.saturating_sub(1);
    }
}

fn jump_section(state: &mut PlaybackState, catalog: &Catalog, delta: i64) {
    let section_count = resolved_section_count(state, catalog);
    let target = state.current_section_index as i64 + delta;
    if target >= 0 && (target as usize) < section_count {
        state.current_section_index = target as usize;
        state.current_line_index = 0;
    }
}

fn resolved_song<'a>(
    state: &PlaybackState,
    catalog: &'a Catalog,
) -> Option<&'a crate::model::Song> {
    state
        .current_song_id
        .as_deref()
        .and_then(|id| catalog.find_by_id(id))
}

fn resolved_section_count(state: &PlaybackState, catalog: &Catalog) -> usize {
    resolved_song(state, catalog).map_or(0, |s| s.sections.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Section, Song};
    use serde_json::json;

    fn section(label: &str, content: &str) -> Section {
        Section {
            label: label.into(),
            content: content.into(),
            background: None,
        }
    }

    fn two_song_catalog() -> Catalog {
        Catalog::from_songs(vec![
            Song {
                id: "a".into(),
                title: "Song A".into(),
                artist: "Artist".into(),
                sections: vec![
                    section("Verse 1", "line1\nline2"),
                    section("Chorus", "line3"),
                ],
            },
            Song {
                id: "b".into(),
                title: "Song B".into(),
                artist: "Artist".into(),
                sections: vec![section("Verse 1", "b1\nb2\nb3")],
            },
        ])
    }

    fn state_at(song: &str, section: usize, line: usize) -> PlaybackState {
        PlaybackState {
            current_song_id: Some(song.into()),
            current_section_index: section,
            current_line_index: line,
            ..Default::default()
        }
    }

    #[test]
    fn next_line_walks_lines_then_sections_then_stops() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 0);

        assert_eq!(apply(&mut state, &catalog, Action::NextLineOrSection), Outcome::Applied);
        assert_eq!((state.current_section_index, state.current_line_index), (0, 1));

        assert_eq!(apply(&mut state, &catalog, Action::NextLineOrSection), Outcome::Applied);
        assert_eq!((state.current_section_index, state.current_line_index), (1, 0));

        // End of song is a hard boundary.
        assert_eq!(apply(&mut state, &catalog, Action::NextLineOrSection), Outcome::NoOp);
        assert_eq!((state.current_section_index, state.current_line_index), (1, 0));
        assert_eq!(state.current_song_id.as_deref(), Some("a"));
    }

    #[test]
    fn prev_line_lands_on_previous_sections_last_line() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 1, 0);

        assert_eq!(apply(&mut state, &catalog, Action::PrevLineOrSection), Outcome::Applied);
        assert_eq!((state.current_section_index, state.current_line_index), (0, 1));
    }

    #[test]
    fn next_then_prev_round_trips_away_from_boundaries() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 0);

        apply(&mut state, &catalog, Action::NextLineOrSection);
        apply(&mut state, &catalog, Action::PrevLineOrSection);
        assert_eq!((state.current_section_index, state.current_line_index), (0, 0));
    }

    #[test]
    fn start_of_first_song_is_a_hard_boundary() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 0);
        assert_eq!(apply(&mut state, &catalog, Action::PrevLineOrSection), Outcome::NoOp);
        assert_eq!(apply(&mut state, &catalog, Action::PrevSection), Outcome::NoOp);
    }

    #[test]
    fn section_jumps_reset_line_and_clamp_at_ends() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 1);

        assert_eq!(apply(&mut state, &catalog, Action::NextSection), Outcome::Applied);
        assert_eq!((state.current_section_index, state.current_line_index), (1, 0));

        assert_eq!(apply(&mut state, &catalog, Action::NextSection), Outcome::NoOp);
    }

    #[test]
    fn next_song_rotates_and_wraps() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 1, 0);

        apply(&mut state, &catalog, Action::NextSong);
        assert_eq!(state.current_song_id.as_deref(), Some("b"));
        assert_eq!((state.current_section_index, state.current_line_index), (0, 0));

        apply(&mut state, &catalog, Action::NextSong);
        assert_eq!(state.current_song_id.as_deref(), Some("a"));
    }

    #[test]
    fn rotation_closure_returns_to_start() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 0);
        for _ in 0..catalog.list().len() {
            apply(&mut state, &catalog, Action::NextSong);
        }
        assert_eq!(state.current_song_id.as_deref(), Some("a"));
    }

    #[test]
    fn select_song_with_unknown_id_is_a_noop() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 1, 0);
        let before = state.clone();

        let outcome = apply(
            &mut state,
            &catalog,
            Action::SelectSong { song_id: "nope".into() },
        );
        assert_eq!(outcome, Outcome::NoOp);
        assert_eq!(state, before);
    }

    #[test]
    fn go_to_section_out_of_range_is_a_noop() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 1);
        let before = state.clone();

        assert_eq!(
            apply(&mut state, &catalog, Action::GoToSection { index: 5 }),
            Outcome::NoOp
        );
        assert_eq!(state, before);
    }

    #[test]
    fn background_override_survives_navigation() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 0, 0);

        apply(
            &mut state,
            &catalog,
            Action::SetBackground {
                background: Background::Image { source: "x.jpg".into() },
            },
        );
        apply(&mut state, &catalog, Action::NextSection);

        assert_eq!(
            state.current_background_override,
            Some(Background::Image { source: "x.jpg".into() })
        );

        // A `none` background clears the override.
        apply(
            &mut state,
            &catalog,
            Action::SetBackground { background: Background::None },
        );
        assert_eq!(state.current_background_override, None);
    }

    #[test]
    fn play_pause_toggle_are_independent_of_position() {
        let catalog = two_song_catalog();
        let mut state = state_at("a", 1, 0);

        assert_eq!(apply(&mut state, &catalog, Action::Play), Outcome::Applied);
        assert!(state.is_playing);
        // PLAY while already playing changes nothing.
        assert_eq!(apply(&mut state, &catalog, Action::Play), Outcome::NoOp);

        apply(&mut state, &catalog, Action::TogglePlay);
        assert!(!state.is_playing);
        assert_eq!((state.current_section_index, state.current_line_index), (1, 0));
    }

    #[test]
    fn dangling_song_id_degrades_to_first_catalog_entry() {
        let catalog = two_song_catalog();
        let mut state = state_at("deleted", 7, 9);

        let outcome = apply(&mut state, &catalog, Action::Pause);
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(state.current_song_id.as_deref(), Some("a"));
        assert_eq!((state.current_section_index, state.current_line_index), (0, 0));
    }

    #[test]
    fn bounds_hold_after_any_action_sequence() {
        let catalog = two_song_catalog();
        let mut state = PlaybackState::default();

        let actions = [
            Action::NextLineOrSection,
            Action::NextSection,
            Action::NextLineOrSection,
            Action::NextSong,
            Action::PrevLineOrSection,
            Action::GoToSection { index: 0 },
            Action::NextSong,
            Action::PrevSection,
            Action::NextLineOrSection,
            Action::NextLineOrSection,
            Action::NextLineOrSection,
            Action::NextLineOrSection,
        ];
        for action in actions {
            apply(&mut state, &catalog, action);

            let song = catalog
                .find_by_id(state.current_song_id.as_deref().unwrap())
                .unwrap();
            assert!(state.current_section_index < song.sections.len());
            let lines = song.sections[state.current_section_index].line_count();
            assert!(state.current_line_index < lines.max(1));
        }
    }

    #[test]
    fn wire_parsing_accepts_both_shapes_and_rejects_garbage() {
        assert_eq!(
            Action::parse_wire(&json!("NEXT_SONG")).unwrap(),
            Action::NextSong
        );
        assert_eq!(
            Action::parse_wire(&json!({"type": "SELECT_SONG", "songId": "a"})).unwrap(),
            Action::SelectSong { song_id: "a".into() }
        );
        assert_eq!(
            Action::parse_wire(&json!({"type": "GO_TO_SECTION", "index": 2})).unwrap(),
            Action::GoToSection { index: 2 }
        );

        assert!(matches!(
            Action::parse_wire(&json!("DO_A_BARREL_ROLL")),
            Err(ActionError::UnknownVerb(_))
        ));
        // Non-numeric section index is malformed, not a silent no-op.
        assert!(matches!(
            Action::parse_wire(&json!({"type": "GO_TO_SECTION", "index": "two"})),
            Err(ActionError::InvalidPayload(_))
        ));
        assert!(matches!(
            Action::parse_wire(&json!(42)),
            Err(ActionError::InvalidPayload(_))
        ));
    }
}
