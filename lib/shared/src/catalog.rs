use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A track as reported by one catalog. The `id` only means something to the
/// catalog that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artists: Vec<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artists,
            album: album.into(),
        }
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// Artists joined the way they are shown to a user.
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }
}

/// The authenticated account on one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: Option<DateTime<Utc>>,
    /// `None` until the track list has been fetched.
    #[serde(default)]
    pub tracks: Option<Vec<Track>>,
}

impl PlaylistRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            created_at: None,
            tracks: None,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.tracks.is_some()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.as_ref().map_or(0, Vec::len)
    }
}

/// Where converted tracks go: an existing destination playlist, or a new one
/// found by name once the catalog lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlaylistSelector {
    Existing { id: String },
    Create { name: String, description: String },
}

impl PlaylistSelector {
    pub fn existing(id: impl Into<String>) -> Self {
        PlaylistSelector::Existing { id: id.into() }
    }

    pub fn create(name: impl Into<String>) -> Self {
        PlaylistSelector::Create {
            name: name.into(),
            description: String::new(),
        }
    }

    /// A new playlist named after the current time.
    pub fn create_default() -> Self {
        Self::create(format!("Imported {}", Utc::now().format("%Y-%m-%d %H:%M:%S")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteMode {
    #[default]
    Append,
    Override,
}
