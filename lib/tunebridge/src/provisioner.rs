use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use shared::catalog::{PlaylistRef, PlaylistSelector, Track, WriteMode};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::traits::CatalogClient;

/// Fixed-interval polling used to wait out the destination's
/// eventual-consistency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
}

/// Resolves or creates the destination playlist and writes tracks into it.
pub struct PlaylistProvisioner {
    client: Arc<dyn CatalogClient>,
    owner_id: String,
    polling: RetryPolicy,
    verification: Option<RetryPolicy>,
    default_description: String,
    cancel: CancellationToken,
}

impl PlaylistProvisioner {
    pub fn new(client: Arc<dyn CatalogClient>, owner_id: impl Into<String>, polling: RetryPolicy) -> Self {
        Self {
            client,
            owner_id: owner_id.into(),
            polling,
            verification: None,
            default_description: String::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Re-read the playlist after each write until every track shows up.
    pub fn with_verification(mut self, policy: RetryPolicy) -> Self {
        self.verification = Some(policy);
        self
    }

    /// Used for created playlists whose selector leaves the description empty.
    pub fn with_default_description(mut self, description: impl Into<String>) -> Self {
        self.default_description = description.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn list_destination_playlists(&self) -> Result<Vec<PlaylistRef>> {
        self.client.list_playlists(&self.owner_id).await
    }

    pub async fn resolve(&self, selector: &PlaylistSelector) -> Result<PlaylistRef> {
        match selector {
            PlaylistSelector::Existing { id } => {
                let playlists = self.list_destination_playlists().await?;
                let playlist = playlists
                    .into_iter()
                    .find(|p| &p.id == id)
                    .ok_or_else(|| ConvertError::PlaylistNotFound(id.clone()))?;
                info!("Found destination playlist: {} ({})", playlist.name, playlist.id);
                Ok(playlist)
            }
            PlaylistSelector::Create { name, description } => {
                let description = if description.is_empty() {
                    &self.default_description
                } else {
                    description
                };
                self.create_and_wait(name, description).await
            }
        }
    }

    async fn create_and_wait(&self, name: &str, description: &str) -> Result<PlaylistRef> {
        info!("Creating destination playlist '{}' on {}", name, self.client.name());
        self.client
            .create_playlist(name, description)
            .await
            .map_err(|e| ConvertError::ProvisioningFailed(format!("create '{name}': {e}")))?;

        for attempt in 1..=self.polling.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }

            match self.list_destination_playlists().await {
                // the catalog only acknowledges creation, so the first playlist
                // carrying the name is taken to be ours
                Ok(playlists) => {
                    if let Some(playlist) = playlists.into_iter().find(|p| p.name == name) {
                        info!(
                            "Playlist '{}' visible as {} after {} poll(s)",
                            name, playlist.id, attempt
                        );
                        return Ok(playlist);
                    }
                    debug!(
                        "Playlist '{}' not listed yet (attempt {}/{})",
                        name, attempt, self.polling.max_attempts
                    );
                }
                Err(e) => warn!(
                    "Listing playlists failed (attempt {}/{}): {}",
                    attempt, self.polling.max_attempts, e
                ),
            }

            if attempt < self.polling.max_attempts {
                sleep(self.polling.interval).await;
            }
        }

        Err(ConvertError::ProvisioningFailed(format!(
            "playlist '{}' did not appear after {} attempts",
            name, self.polling.max_attempts
        )))
    }

    pub async fn write(
        &self,
        playlist: &PlaylistRef,
        tracks: &[Track],
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        info!(
            "Writing {} tracks to '{}' ({:?})",
            ids.len(),
            playlist.name,
            mode
        );

        let written = match mode {
            WriteMode::Append => self.client.add_tracks(&playlist.id, &ids).await,
            WriteMode::Override => self.client.replace_tracks(&playlist.id, &ids).await,
        };
        written.map_err(|e| ConvertError::WriteFailed(e.to_string()))?;

        if let Some(policy) = self.verification {
            self.verify(playlist, tracks, policy).await?;
        }

        Ok(WriteReport {
            written: ids.len(),
        })
    }

    /// Only the read is retried; writing again could add tracks twice.
    async fn verify(&self, playlist: &PlaylistRef, tracks: &[Track], policy: RetryPolicy) -> Result<()> {
        let mut missing: Vec<Track> = tracks.to_vec();

        for attempt in 1..=policy.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }
            sleep(policy.interval).await;

            match self.client.list_tracks(&playlist.id).await {
                Ok(present) => {
                    let titles: HashSet<&str> = present.iter().map(|t| t.title.as_str()).collect();
                    missing = tracks
                        .iter()
                        .filter(|t| !titles.contains(t.title.as_str()))
                        .cloned()
                        .collect();
                    if missing.is_empty() {
                        info!("Verified all {} tracks in '{}'", tracks.len(), playlist.name);
                        return Ok(());
                    }
                    debug!(
                        "{} tracks not visible in '{}' yet (attempt {}/{})",
                        missing.len(),
                        playlist.name,
                        attempt,
                        policy.max_attempts
                    );
                }
                Err(e) => warn!(
                    "Reading back '{}' failed (attempt {}/{}): {}",
                    playlist.name, attempt, policy.max_attempts, e
                ),
            }
        }

        for track in &missing {
            warn!(
                "Track missing after write: {} - {} ({})",
                track.title,
                track.artist_display(),
                track.id
            );
        }
        Err(ConvertError::WriteVerificationFailed { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{track, MockCatalog, SearchBehaviour};
    use tokio::time::Instant;

    fn provisioner(catalog: &Arc<MockCatalog>) -> PlaylistProvisioner {
        PlaylistProvisioner::new(
            catalog.clone(),
            "me",
            RetryPolicy::new(Duration::from_secs(2), 5),
        )
    }

    #[tokio::test]
    async fn finds_existing_playlist_by_id() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.add_playlist(PlaylistRef::new("p.1", "Road Trip", "me"));
        catalog.add_playlist(PlaylistRef::new("p.2", "Focus", "me"));

        let found = provisioner(&catalog)
            .resolve(&PlaylistSelector::existing("p.2"))
            .await
            .unwrap();
        assert_eq!(found.name, "Focus");
    }

    #[tokio::test]
    async fn unknown_existing_id_is_not_found() {
        let catalog = Arc::new(MockCatalog::new());
        let err = provisioner(&catalog)
            .resolve(&PlaylistSelector::existing("p.404"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::PlaylistNotFound(id) if id == "p.404"));
    }

    #[tokio::test(start_paused = true)]
    async fn created_playlist_found_on_third_poll() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.created_playlist_appears_after(Some(3));
        let started = Instant::now();

        let playlist = provisioner(&catalog)
            .resolve(&PlaylistSelector::create("Converted"))
            .await
            .unwrap();

        assert_eq!(playlist.name, "Converted");
        assert_eq!(catalog.list_playlists_calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn empty_description_falls_back_to_default() {
        let catalog = Arc::new(MockCatalog::new());
        let provisioner = provisioner(&catalog).with_default_description("Converted playlist");

        provisioner
            .resolve(&PlaylistSelector::create("Plain"))
            .await
            .unwrap();
        provisioner
            .resolve(&PlaylistSelector::Create {
                name: "Custom".to_string(),
                description: "Mine".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            catalog.descriptions(),
            vec!["Converted playlist".to_string(), "Mine".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_budget() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.created_playlist_appears_after(None);
        let started = Instant::now();

        let err = provisioner(&catalog)
            .resolve(&PlaylistSelector::create("Never"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ProvisioningFailed(_)));
        assert_eq!(catalog.list_playlists_calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn listing_errors_count_as_misses() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.fail_listing(true);

        let err = provisioner(&catalog)
            .resolve(&PlaylistSelector::create("Flaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ProvisioningFailed(_)));
        assert_eq!(catalog.list_playlists_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn first_name_match_wins_over_a_new_playlist() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.add_playlist(PlaylistRef::new("p.old", "Mix", "me"));

        let playlist = provisioner(&catalog)
            .resolve(&PlaylistSelector::create("Mix"))
            .await
            .unwrap();
        assert_eq!(playlist.id, "p.old");
    }

    #[tokio::test]
    async fn cancelled_before_polling() {
        let catalog = Arc::new(MockCatalog::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provisioner(&catalog)
            .with_cancellation(cancel)
            .resolve(&PlaylistSelector::create("Mix"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
        assert_eq!(catalog.list_playlists_calls(), 0);
    }

    #[tokio::test]
    async fn append_and_override_use_different_calls() {
        let catalog = Arc::new(MockCatalog::new());
        let playlist = PlaylistRef::new("p.1", "Mix", "me");
        let tracks = vec![track("a1", "A", "X", "1")];
        let provisioner = provisioner(&catalog);

        provisioner.write(&playlist, &tracks, WriteMode::Append).await.unwrap();
        provisioner.write(&playlist, &tracks, WriteMode::Override).await.unwrap();

        assert_eq!(catalog.added(), vec![("p.1".to_string(), vec!["a1".to_string()])]);
        assert_eq!(catalog.replaced(), vec![("p.1".to_string(), vec!["a1".to_string()])]);
    }

    #[tokio::test]
    async fn rejected_write_is_a_write_failure() {
        let catalog = Arc::new(MockCatalog::new());
        catalog.fail_writes();
        let err = provisioner(&catalog)
            .write(&PlaylistRef::new("p.1", "Mix", "me"), &[], WriteMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::WriteFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn verification_reports_tracks_that_never_appear() {
        let catalog = Arc::new(MockCatalog::new());
        let kept = track("a1", "Kept", "X", "1");
        let lost = track("a2", "Lost", "Y", "2");
        catalog.on_search("Kept", SearchBehaviour::Results(vec![kept.clone(), lost.clone()]));
        catalog.hide_after_write("a2");

        let err = provisioner(&catalog)
            .with_verification(RetryPolicy::new(Duration::from_secs(1), 3))
            .write(
                &PlaylistRef::new("p.1", "Mix", "me"),
                &[kept, lost.clone()],
                WriteMode::Append,
            )
            .await
            .unwrap_err();

        match err {
            ConvertError::WriteVerificationFailed { missing } => assert_eq!(missing, vec![lost]),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(catalog.added().len(), 1);
        assert_eq!(catalog.list_tracks_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_passes_when_everything_landed() {
        let catalog = Arc::new(MockCatalog::new());
        let a = track("a1", "A", "X", "1");
        catalog.on_search("A", SearchBehaviour::Results(vec![a.clone()]));

        let report = provisioner(&catalog)
            .with_verification(RetryPolicy::new(Duration::from_secs(1), 3))
            .write(&PlaylistRef::new("p.1", "Mix", "me"), &[a], WriteMode::Override)
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(catalog.list_tracks_calls(), 1);
    }
}
