//! # Data Model
//!
//! Core types shared by the catalog, the playback state machine, and the
//! synchronization hub. All wire-facing structs serialize with camelCase
//! field names to match the browser clients.
//!
//! ## Position Model
//!
//! A position is `(song, section, line)`. Sections come from catalog data in
//! a fixed order; lines are the non-blank lines of a section's `content`.
//! The state machine only ever indexes into these, it never reorders them.

use serde::{Deserialize, Serialize};

/// A visual background attached to a section or set as a global override.
///
/// `None` means "fall back to the active section's own background, if any"
/// when used as an override, and "no background" when used on a section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Background {
    /// A still image, referenced by URI.
    Image { source: String },
    /// A looping video, referenced by URI.
    Video { source: String },
    /// No background.
    #[default]
    None,
}

/// One navigable block of a song (verse, chorus, bridge, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    /// Free-text label, e.g. "Chorus".
    pub label: String,
    /// Multi-line lyric text. Each non-blank line is a navigable unit.
    pub content: String,
    /// Optional per-section background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
}

impl Section {
    /// Returns the non-blank lines of this section, in order.
    pub fn lines(&self) -> Vec<&str> {
        self.content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Number of non-blank lines.
    pub fn line_count(&self) -> usize {
        self.lines().len()
    }
}

/// A song from the pre-authored setlist or the user library.
///
/// `id` is the primary key, unique across catalog and library. Songs are
/// immutable once loaded except through explicit library save/delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Song {
    /// Stable identifier. Acts as the primary key for upsert/delete.
    pub id: String,
    /// The song title, for display and id normalization.
    pub title: String,
    /// The artist name, for display and id normalization.
    pub artist: String,
    /// Ordered sections. Order is significant and fixed by the source data.
    pub sections: Vec<Section>,
}

/// Advisory flags for the performer-side input handlers.
///
/// The core stores and republishes these; it does not enforce them. Both
/// default to enabled, matching the controller client's startup behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PerformerSettings {
    pub gestures_enabled: bool,
    pub voice_enabled: bool,
}

impl Default for PerformerSettings {
    fn default() -> Self {
        Self {
            gestures_enabled: true,
            voice_enabled: true,
        }
    }
}

/// A typed partial update for [`PerformerSettings`].
///
/// Only the fields present in the wire message are applied; unrecognized
/// fields are rejected by serde at the boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PerformerSettingsPatch {
    pub gestures: Option<bool>,
    pub voice: Option<bool>,
}

impl PerformerSettings {
    /// Merges a partial update field-by-field. Returns true if anything
    /// actually changed.
    pub fn apply_patch(&mut self, patch: PerformerSettingsPatch) -> bool {
        let before = *self;
        if let Some(g) = patch.gestures {
            self.gestures_enabled = g;
        }
        if let Some(v) = patch.voice {
            self.voice_enabled = v;
        }
        *self != before
    }
}

/// The single authoritative playback position. Exactly one instance exists
/// per running process, owned by the session actor and mutated only by the
/// state machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Reference into catalog + library, or unset before the first selection.
    pub current_song_id: Option<String>,
    /// Always a valid index into the resolved song's sections (0 if none).
    pub current_section_index: usize,
    /// Always a valid index into the section's non-blank lines (0 if none).
    pub current_line_index: usize,
    pub is_playing: bool,
    #[serde(default)]
    pub performer_settings: PerformerSettings,
    /// When set, takes precedence over the section background in projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_background_override: Option<Background>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_lines_skip_blanks() {
        let sec = Section {
            label: "Verse 1".into(),
            content: "line1\n\n  \nline2\n".into(),
            background: None,
        };
        assert_eq!(sec.lines(), vec!["line1", "line2"]);
        assert_eq!(sec.line_count(), 2);
    }

    #[test]
    fn settings_patch_merges_field_by_field() {
        let mut settings = PerformerSettings::default();
        let changed = settings.apply_patch(PerformerSettingsPatch {
            gestures: Some(false),
            voice: None,
        });
        assert!(changed);
        assert!(!settings.gestures_enabled);
        assert!(settings.voice_enabled);

        // Re-applying the same patch is a no-op.
        let changed = settings.apply_patch(PerformerSettingsPatch {
            gestures: Some(false),
            voice: None,
        });
        assert!(!changed);
    }

    #[test]
    fn background_wire_shape_is_tagged() {
        let bg = Background::Image {
            source: "x.jpg".into(),
        };
        let json = serde_json::to_value(&bg).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["source"], "x.jpg");

        let none: Background = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, Background::None);
    }
}
