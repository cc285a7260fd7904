use std::time::Duration;

use futures::future::join_all;
use itertools::Itertools;
use shared::catalog::{PlaylistRef, Track};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::ConvertError, error::Result, traits::CatalogClient};

/// Loads the playlist's tracks unless they were already loaded.
pub async fn fetch_tracks<'a>(
    client: &dyn CatalogClient,
    playlist: &'a mut PlaylistRef,
) -> Result<&'a [Track]> {
    if playlist.tracks.is_none() {
        let tracks = client.list_tracks(&playlist.id).await?;
        debug!(
            "Fetched {} tracks for playlist '{}' from {}",
            tracks.len(),
            playlist.name,
            client.name()
        );
        playlist.tracks = Some(tracks);
    }
    Ok(playlist.tracks.as_deref().unwrap_or_default())
}

/// Fetches tracks for several playlists at once. Playlists are independent, so
/// one failing leaves the others populated; failures come back by playlist id.
pub async fn prime_playlists(
    client: &dyn CatalogClient,
    playlists: &mut [PlaylistRef],
) -> Vec<(String, ConvertError)> {
    let total = playlists.len();
    let results = join_all(playlists.iter_mut().map(|playlist| async move {
        let id = playlist.id.clone();
        fetch_tracks(client, playlist)
            .await
            .map(|_| ())
            .map_err(|e| (id, e))
    }))
    .await;

    let (loaded, failures): (Vec<()>, Vec<(String, ConvertError)>) =
        results.into_iter().partition_result();

    for (id, e) in &failures {
        warn!("Failed to fetch tracks for playlist {}: {}", id, e);
    }
    info!(
        "Primed {}/{} playlists from {}",
        loaded.len(),
        total,
        client.name()
    );

    failures
}

/// One destination search bounded by `limit`. Cancellation abandons the call
/// in flight.
pub async fn search_bounded(
    client: &dyn CatalogClient,
    title: &str,
    artist: &str,
    album: &str,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Track>> {
    let search = async {
        tokio::time::timeout(limit, client.search(title, artist, album))
            .await
            .map_err(|_| ConvertError::SearchTimeout(limit))?
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        results = search => results,
    }
}
