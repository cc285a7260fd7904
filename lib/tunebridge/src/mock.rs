//! In-memory catalog used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use shared::catalog::{Identity, PlaylistRef, Track};

use crate::error::{ConvertError, Result};
use crate::traits::{AuthClient, CatalogClient};

pub fn track(id: &str, title: &str, artist: &str, album: &str) -> Track {
    Track::new(id, title, vec![artist.to_string()], album)
}

#[derive(Clone)]
pub enum SearchBehaviour {
    Results(Vec<Track>),
    Fail,
    Hang,
}

#[derive(Default)]
struct State {
    playlists: Vec<PlaylistRef>,
    tracks: HashMap<String, Vec<Track>>,
    failing_tracks: HashSet<String>,
    searches: HashMap<String, SearchBehaviour>,
    search_log: Vec<String>,
    /// Created playlist and the number of listings that still miss it.
    pending: Option<(PlaylistRef, usize)>,
    appear_after: Option<usize>,
    created: Vec<String>,
    descriptions: Vec<String>,
    fail_listing: bool,
    fail_writes: bool,
    hidden_after_write: HashSet<String>,
    added: Vec<(String, Vec<String>)>,
    replaced: Vec<(String, Vec<String>)>,
    list_playlists_calls: usize,
    list_tracks_calls: usize,
}

pub struct MockCatalog {
    state: Mutex<State>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                appear_after: Some(1),
                ..Default::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_playlist(&self, playlist: PlaylistRef) {
        self.with(|s| s.playlists.push(playlist));
    }

    pub fn set_tracks(&self, playlist_id: &str, tracks: Vec<Track>) {
        self.with(|s| s.tracks.insert(playlist_id.to_string(), tracks));
    }

    pub fn fail_tracks(&self, playlist_id: &str) {
        self.with(|s| s.failing_tracks.insert(playlist_id.to_string()));
    }

    pub fn on_search(&self, title: &str, behaviour: SearchBehaviour) {
        self.with(|s| s.searches.insert(title.to_string(), behaviour));
    }

    /// A created playlist first shows up on the `n`th listing; `None` never.
    pub fn created_playlist_appears_after(&self, n: Option<usize>) {
        self.with(|s| s.appear_after = n);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.with(|s| s.fail_listing = fail);
    }

    pub fn fail_writes(&self) {
        self.with(|s| s.fail_writes = true);
    }

    /// Written tracks with these ids never show up when the playlist is read.
    pub fn hide_after_write(&self, track_id: &str) {
        self.with(|s| s.hidden_after_write.insert(track_id.to_string()));
    }

    pub fn searches(&self) -> Vec<String> {
        self.with(|s| s.search_log.clone())
    }

    pub fn created(&self) -> Vec<String> {
        self.with(|s| s.created.clone())
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.with(|s| s.descriptions.clone())
    }

    pub fn added(&self) -> Vec<(String, Vec<String>)> {
        self.with(|s| s.added.clone())
    }

    pub fn replaced(&self) -> Vec<(String, Vec<String>)> {
        self.with(|s| s.replaced.clone())
    }

    pub fn list_playlists_calls(&self) -> usize {
        self.with(|s| s.list_playlists_calls)
    }

    pub fn list_tracks_calls(&self) -> usize {
        self.with(|s| s.list_tracks_calls)
    }

    fn written(s: &mut State, playlist_id: &str, ids: &[String], replace: bool) {
        let lookup: Vec<Track> = s
            .searches
            .values()
            .filter_map(|b| match b {
                SearchBehaviour::Results(tracks) => Some(tracks.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        let hidden = s.hidden_after_write.clone();
        let entry = s.tracks.entry(playlist_id.to_string()).or_default();
        if replace {
            entry.clear();
        }
        for id in ids.iter().filter(|id| !hidden.contains(*id)) {
            if let Some(t) = lookup.iter().find(|t| &t.id == id) {
                entry.push(t.clone());
            }
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn list_playlists(&self, _owner_id: &str) -> Result<Vec<PlaylistRef>> {
        self.with(|s| {
            s.list_playlists_calls += 1;
            if s.fail_listing {
                return Err(ConvertError::catalog(503, "listing unavailable"));
            }
            if let Some((playlist, remaining)) = s.pending.take() {
                if remaining <= 1 {
                    s.playlists.push(playlist);
                } else {
                    s.pending = Some((playlist, remaining - 1));
                }
            }
            Ok(s.playlists.clone())
        })
    }

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.with(|s| {
            s.list_tracks_calls += 1;
            if s.failing_tracks.contains(playlist_id) {
                return Err(ConvertError::catalog(500, "tracks unavailable"));
            }
            Ok(s.tracks.get(playlist_id).cloned().unwrap_or_default())
        })
    }

    async fn search(&self, title: &str, _artist: &str, _album: &str) -> Result<Vec<Track>> {
        let behaviour = self.with(|s| {
            s.search_log.push(title.to_string());
            s.searches.get(title).cloned()
        });
        match behaviour {
            Some(SearchBehaviour::Results(tracks)) => Ok(tracks),
            Some(SearchBehaviour::Fail) => Err(ConvertError::catalog(502, "bad gateway")),
            Some(SearchBehaviour::Hang) => std::future::pending().await,
            None => Ok(vec![]),
        }
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<()> {
        self.with(|s| {
            s.created.push(name.to_string());
            s.descriptions.push(description.to_string());
            let id = format!("p.created.{}", s.created.len());
            if let Some(n) = s.appear_after {
                s.pending = Some((PlaylistRef::new(id, name, "me"), n));
            }
            Ok(())
        })
    }

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.with(|s| {
            if s.fail_writes {
                return Err(ConvertError::catalog(500, "write rejected"));
            }
            s.added.push((playlist_id.to_string(), track_ids.to_vec()));
            Self::written(s, playlist_id, track_ids, false);
            Ok(())
        })
    }

    async fn replace_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.with(|s| {
            if s.fail_writes {
                return Err(ConvertError::catalog(500, "write rejected"));
            }
            s.replaced.push((playlist_id.to_string(), track_ids.to_vec()));
            Self::written(s, playlist_id, track_ids, true);
            Ok(())
        })
    }
}

pub struct MockAuth {
    pub identity: Option<Identity>,
}

impl MockAuth {
    pub fn accepting(user_id: &str) -> Self {
        Self {
            identity: Some(Identity {
                user_id: user_id.to_string(),
                display_name: user_id.to_string(),
            }),
        }
    }

    pub fn rejecting() -> Self {
        Self { identity: None }
    }
}

#[async_trait]
impl AuthClient for MockAuth {
    async fn login(&self, _credential: &str) -> Result<Identity> {
        self.identity
            .clone()
            .ok_or_else(|| ConvertError::Auth("invalid credential".to_string()))
    }
}
