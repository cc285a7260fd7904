use std::sync::Arc;

use shared::{
    catalog::{PlaylistRef, PlaylistSelector, Track, WriteMode},
    conversion::{
        AmbiguityPolicy, ConversionEvent, ConversionOutcome, ConversionSummary, JobState,
        SkipReason,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog;
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::matching::{self, Resolution};
use crate::provisioner::PlaylistProvisioner;
use crate::resolution::ResolutionChannel;
use crate::traits::{CatalogClient, NullSink, ProgressSink};

/// One conversion of a source playlist into a destination playlist. The job
/// owns its outcomes; only the converter running it appends to them.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source: PlaylistRef,
    pub destination: PlaylistSelector,
    pub mode: WriteMode,
    pub ambiguity: AmbiguityPolicy,
    outcomes: Vec<ConversionOutcome>,
    state: JobState,
    destination_playlist: Option<PlaylistRef>,
    unwritten: Vec<Track>,
}

impl ConversionJob {
    pub fn new(source: PlaylistRef, destination: PlaylistSelector, mode: WriteMode) -> Self {
        Self {
            source,
            destination,
            mode,
            ambiguity: AmbiguityPolicy::default(),
            outcomes: Vec::new(),
            state: JobState::Provisioning,
            destination_playlist: None,
            unwritten: Vec::new(),
        }
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// One outcome per processed source track, in source order.
    pub fn outcomes(&self) -> &[ConversionOutcome] {
        &self.outcomes
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn destination_playlist(&self) -> Option<&PlaylistRef> {
        self.destination_playlist.as_ref()
    }

    pub fn summary(&self) -> ConversionSummary {
        let sources = self.source.tracks.as_deref().unwrap_or_default();
        let mut summary = ConversionSummary::from_outcomes(sources, &self.outcomes);
        summary.destination_id = self.destination_playlist.as_ref().map(|p| p.id.clone());
        summary.unwritten = self.unwritten.clone();
        summary
    }

    fn accepted(&self) -> Vec<Track> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ConversionOutcome::Matched { candidate } => Some(candidate.track.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Drives jobs from the source catalog to the destination catalog, one track
/// at a time.
pub struct Converter {
    source: Arc<dyn CatalogClient>,
    destination: Arc<dyn CatalogClient>,
    provisioner: PlaylistProvisioner,
    resolver: Option<ResolutionChannel>,
    sink: Arc<dyn ProgressSink>,
    config: ConverterConfig,
    cancel: CancellationToken,
}

impl Converter {
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::new()
    }

    /// Runs the job to a terminal state. On error the job keeps every outcome
    /// recorded so far and `job.summary()` still describes them.
    pub async fn run(&self, job: &mut ConversionJob) -> Result<ConversionSummary> {
        job.state = JobState::Provisioning;

        match self.execute(job).await {
            Ok(summary) => {
                job.state = JobState::Completed;
                info!(
                    "Conversion of '{}' completed: {} matched, {} skipped, {} failed",
                    job.source.name,
                    summary.matched.len(),
                    summary.skipped.len(),
                    summary.failed.len()
                );
                self.sink.emit(ConversionEvent::Completed {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(ConvertError::Cancelled) => {
                job.state = JobState::Cancelled;
                info!(
                    "Conversion of '{}' cancelled after {} tracks",
                    job.source.name,
                    job.outcomes.len()
                );
                self.sink.emit(ConversionEvent::Failed {
                    reason: ConvertError::Cancelled.to_string(),
                });
                Err(ConvertError::Cancelled)
            }
            Err(e) => {
                let reason = e.to_string();
                error!("Conversion of '{}' failed: {}", job.source.name, reason);
                job.state = JobState::Failed(reason.clone());
                self.sink.emit(ConversionEvent::Failed { reason });
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &mut ConversionJob) -> Result<ConversionSummary> {
        let tracks = catalog::fetch_tracks(self.source.as_ref(), &mut job.source)
            .await?
            .to_vec();
        let total = tracks.len();

        info!(
            "Converting '{}' ({} tracks) from {} to {}",
            job.source.name,
            total,
            self.source.name(),
            self.destination.name()
        );
        self.sink.emit(ConversionEvent::Progress {
            percent: 0,
            current_track: None,
            note: format!("converting '{}' ({} tracks)", job.source.name, total),
        });

        let destination = self.provisioner.resolve(&job.destination).await?;
        job.destination_playlist = Some(destination.clone());

        job.state = JobState::Running;
        job.outcomes = Vec::with_capacity(total);
        job.unwritten.clear();

        for (index, track) in tracks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }

            let outcome = self.convert_track(track, job.ambiguity).await?;
            let processed = index + 1;
            self.sink.emit(ConversionEvent::Progress {
                percent: (processed * 100 / total) as u8,
                current_track: Some(track.clone()),
                note: outcome.note(),
            });
            job.outcomes.push(outcome);
        }

        job.state = JobState::Finalizing;
        let accepted = job.accepted();
        if accepted.is_empty() {
            // an override with nothing accepted would wipe the destination
            info!("No tracks accepted for '{}', nothing to write", destination.name);
        } else {
            match self.provisioner.write(&destination, &accepted, job.mode).await {
                Ok(report) => info!("Wrote {} tracks to '{}'", report.written, destination.name),
                Err(ConvertError::WriteVerificationFailed { missing }) => {
                    job.unwritten = missing.clone();
                    return Err(ConvertError::WriteVerificationFailed { missing });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(job.summary())
    }

    /// Only cancellation escapes as an error; everything else becomes this
    /// track's outcome.
    async fn convert_track(&self, track: &Track, policy: AmbiguityPolicy) -> Result<ConversionOutcome> {
        let artist = track.primary_artist().unwrap_or_default();
        let search = catalog::search_bounded(
            self.destination.as_ref(),
            &track.title,
            artist,
            &track.album,
            self.config.search_timeout,
            &self.cancel,
        )
        .await;

        let results = match search {
            Ok(results) => results,
            Err(ConvertError::Cancelled) => return Err(ConvertError::Cancelled),
            Err(e) => {
                warn!("Search for '{}' failed: {}", track.title, e);
                return Ok(ConversionOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        match matching::classify(track, results) {
            Resolution::AutoMatched(candidate) => {
                info!(
                    "Matched '{}' to {} (score {})",
                    track.title, candidate.track.id, candidate.score
                );
                Ok(ConversionOutcome::Matched { candidate })
            }
            Resolution::NoCandidates => {
                warn!(
                    "No candidates for '{}' - {}",
                    track.title,
                    track.artist_display()
                );
                Ok(ConversionOutcome::Skipped {
                    reason: SkipReason::NoCandidates,
                })
            }
            Resolution::Ambiguous(candidates) => match (policy, &self.resolver) {
                (AmbiguityPolicy::Interactive, Some(resolver)) => {
                    let resolved = resolver
                        .resolve(
                            self.sink.as_ref(),
                            self.destination.as_ref(),
                            track,
                            candidates,
                            &self.cancel,
                        )
                        .await;
                    match resolved {
                        Ok(outcome) => Ok(outcome),
                        Err(ConvertError::Cancelled) => Err(ConvertError::Cancelled),
                        Err(e) => Ok(ConversionOutcome::Failed {
                            reason: e.to_string(),
                        }),
                    }
                }
                (AmbiguityPolicy::Interactive, None) => {
                    warn!(
                        "'{}' is ambiguous but no one can resolve it, skipping",
                        track.title
                    );
                    Ok(ConversionOutcome::Skipped {
                        reason: SkipReason::AutoSkipped,
                    })
                }
                (AmbiguityPolicy::SkipAmbiguous, _) => Ok(ConversionOutcome::Skipped {
                    reason: SkipReason::AutoSkipped,
                }),
            },
        }
    }
}

#[derive(Default)]
pub struct ConverterBuilder {
    source: Option<Arc<dyn CatalogClient>>,
    destination: Option<Arc<dyn CatalogClient>>,
    owner_id: Option<String>,
    config: Option<ConverterConfig>,
    sink: Option<Arc<dyn ProgressSink>>,
    resolver: Option<ResolutionChannel>,
    cancel: Option<CancellationToken>,
}

impl ConverterBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn source(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.source = Some(client);
        self
    }

    /// The destination catalog and the account that owns its playlists.
    pub fn destination(mut self, client: Arc<dyn CatalogClient>, owner_id: &str) -> Self {
        self.destination = Some(client);
        self.owner_id = Some(owner_id.to_string());
        self
    }

    pub fn config(mut self, config: ConverterConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn resolver(mut self, channel: ResolutionChannel) -> Self {
        self.resolver = Some(channel);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Converter> {
        let source = self
            .source
            .ok_or_else(|| ConvertError::Config("source catalog required".to_string()))?;
        let destination = self
            .destination
            .ok_or_else(|| ConvertError::Config("destination catalog required".to_string()))?;
        let owner_id = self.owner_id.unwrap_or_default();
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let cancel = self.cancel.unwrap_or_default();

        let mut provisioner =
            PlaylistProvisioner::new(destination.clone(), owner_id, config.provisioning)
                .with_default_description(config.playlist_description.clone())
                .with_cancellation(cancel.clone());
        if config.verify_writes {
            provisioner = provisioner.with_verification(config.verification);
        }

        let resolver = self.resolver.map(|r| {
            r.with_timeout(config.manual_resolution_timeout)
                .with_search_timeout(config.search_timeout)
        });
        Ok(Converter {
            source,
            destination,
            provisioner,
            resolver,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            config,
            cancel,
        })
    }
}
