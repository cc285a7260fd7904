use async_trait::async_trait;
use shared::{
    catalog::{Identity, PlaylistRef, Track},
    conversion::ConversionEvent,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::Result;

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(&self, credential: &str) -> Result<Identity>;
}

/// Operations the engine needs from a music catalog. Transport, signing and
/// pagination are the implementor's business.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;

    /// Playlists owned by `owner_id`, without tracks.
    async fn list_playlists(&self, owner_id: &str) -> Result<Vec<PlaylistRef>>;

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Results in the catalog's own relevance order.
    async fn search(&self, title: &str, artist: &str, album: &str) -> Result<Vec<Track>>;

    /// Only acknowledges the request; the playlist may not be listed yet.
    async fn create_playlist(&self, name: &str, description: &str) -> Result<()>;

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;

    async fn replace_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;
}

/// Push-only observer of a conversion. Implementations must not block and
/// must swallow their own delivery failures.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ConversionEvent);
}

impl ProgressSink for broadcast::Sender<ConversionEvent> {
    fn emit(&self, event: ConversionEvent) {
        // no subscribers is not an error, the conversion keeps going
        let _ = self.send(event);
    }
}

/// Queue slots progress updates leave free on a bounded sink, so selection
/// requests and terminal events get through to a lagging consumer.
const CONTROL_SLOTS: usize = 4;

/// Progress updates are dropped first when the queue backs up.
impl ProgressSink for mpsc::Sender<ConversionEvent> {
    fn emit(&self, event: ConversionEvent) {
        let reserved = CONTROL_SLOTS.min(self.max_capacity() / 2);
        if matches!(event, ConversionEvent::Progress { .. }) && self.capacity() <= reserved {
            debug!("Progress queue backed up, dropping update");
            return;
        }

        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Progress queue full, dropping event: {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ConversionEvent) {}
}
