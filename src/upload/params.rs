//! Tracker upload parameter construction.
//!
//! Turns a stored [`Album`] into the form fields a Gazelle-style tracker
//! expects: credited artists with their importance, normalized tags, a
//! generated description and the release metadata.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::{Album, RecordType};

/// Gazelle upload category for music.
pub const MUSIC_CATEGORY: u8 = 0;

/// Label values containing this (case-insensitive) are distributor placeholders.
const PLACEHOLDER_LABEL_MARKER: &str = "records dk";

#[allow(clippy::expect_used)]
static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("tag separator regex is valid"));

/// Importance ranking for a catalog contributor role.
///
/// Unknown roles rank as main artists.
#[must_use]
pub fn role_importance(role: &str) -> u8 {
    match role.trim().to_ascii_lowercase().as_str() {
        "guest" | "featured" => 2,
        "remixer" => 3,
        "composer" => 4,
        "conductor" => 5,
        "dj" | "compiler" => 6,
        "producer" => 7,
        _ => 1,
    }
}

/// Gazelle release type code.
#[must_use]
pub fn release_type_code(record_type: RecordType) -> u8 {
    match record_type {
        RecordType::Album => 1,
        RecordType::Ep => 5,
        RecordType::Single => 9,
        RecordType::Compilation => 7,
    }
}

/// Lowercase alphanumeric genre tokens joined by commas.
#[must_use]
pub fn normalize_tags(genres: &[String]) -> String {
    let joined = genres.join(",").to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&joined, ",")
        .trim_matches(',')
        .to_string()
}

/// Drops distributor placeholder labels.
#[must_use]
pub fn clean_record_label(label: &str) -> String {
    if label.to_lowercase().contains(PLACEHOLDER_LABEL_MARKER) {
        String::new()
    } else {
        label.to_string()
    }
}

/// Renders seconds as `H:MM:SS`.
#[must_use]
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Release description: label, year, genres, numbered tracklist and runtime.
#[must_use]
pub fn album_description(album: &Album, label: &str) -> String {
    let mut tracks: Vec<_> = album.tracks.iter().collect();
    tracks.sort_by_key(|t| t.position);

    let mut lines = vec![
        format!("Label: {label}"),
        format!("Year: {}", album.year()),
        format!("Genres: {}", album.genres.join(", ")),
        String::new(),
        "Tracklist:".to_string(),
    ];
    for track in tracks {
        lines.push(format!(
            "{}. {} [{}]",
            track.position,
            track.title,
            format_duration(u64::from(track.duration_seconds))
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "Total length: {}",
        format_duration(album.total_duration_seconds())
    ));
    lines.join("\n")
}

/// Parameters submitted with a tracker upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadParameters {
    #[serde(rename = "type")]
    pub category: u8,
    pub artists: Vec<String>,
    pub importance: Vec<u8>,
    pub title: String,
    pub year: i32,
    pub releasetype: u8,
    pub media: String,
    pub format: String,
    pub bitrate: String,
    pub tags: String,
    pub image: String,
    pub album_desc: String,
    pub remaster_year: i32,
    pub remaster_record_label: String,
    pub remaster_catalogue_number: String,
}

impl UploadParameters {
    /// Builds parameters for `album`; `artist_name` is credited when the album
    /// has no contributors.
    #[must_use]
    pub fn from_album(album: &Album, artist_name: &str) -> Self {
        let (artists, importance) = if album.contributors.is_empty() {
            (vec![artist_name.to_string()], vec![1])
        } else {
            album
                .contributors
                .iter()
                .map(|c| (c.name.clone(), role_importance(&c.role)))
                .unzip()
        };
        let label = clean_record_label(&album.label);

        Self {
            category: MUSIC_CATEGORY,
            artists,
            importance,
            title: album.title.clone(),
            year: album.year(),
            releasetype: release_type_code(album.record_type),
            media: "WEB".to_string(),
            format: "FLAC".to_string(),
            bitrate: "Lossless".to_string(),
            tags: normalize_tags(&album.genres),
            image: album.image_url.clone(),
            album_desc: album_description(album, &label),
            remaster_year: album.year(),
            remaster_record_label: label,
            remaster_catalogue_number: album.upc.clone(),
        }
    }

    /// Flattens into multipart form fields (`artists[]` / `importance[]` repeat).
    #[must_use]
    pub fn to_form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("type".to_string(), self.category.to_string())];
        for (artist, importance) in self.artists.iter().zip(&self.importance) {
            fields.push(("artists[]".to_string(), artist.clone()));
            fields.push(("importance[]".to_string(), importance.to_string()));
        }
        fields.extend([
            ("title".to_string(), self.title.clone()),
            ("year".to_string(), self.year.to_string()),
            ("releasetype".to_string(), self.releasetype.to_string()),
            ("media".to_string(), self.media.clone()),
            ("format".to_string(), self.format.clone()),
            ("bitrate".to_string(), self.bitrate.clone()),
            ("tags".to_string(), self.tags.clone()),
            ("image".to_string(), self.image.clone()),
            ("album_desc".to_string(), self.album_desc.clone()),
            ("remaster_year".to_string(), self.remaster_year.to_string()),
            (
                "remaster_record_label".to_string(),
                self.remaster_record_label.clone(),
            ),
            (
                "remaster_catalogue_number".to_string(),
                self.remaster_catalogue_number.clone(),
            ),
        ]);
        fields
    }
}
