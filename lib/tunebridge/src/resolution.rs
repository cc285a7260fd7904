//! Single-slot rendezvous between a running conversion and whoever decides
//! ambiguous tracks.
//!
//! The conversion side publishes one `ManualSelectionRequest` and waits for
//! exactly one [`Decision`]. The deciding side answers through a cloneable
//! [`ResolutionHandle`]. Only one request is ever outstanding because the
//! conversion does not move on until it has its answer.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::{
    catalog::Track,
    conversion::{ConversionEvent, ConversionOutcome, MatchCandidate, SkipReason},
};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::matching;
use crate::traits::{CatalogClient, ProgressSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "camelCase")]
pub enum Decision {
    /// Accept the candidate with this destination id.
    Select(String),
    Skip,
    /// Search the destination again with free text and offer those results.
    Search(String),
}

type Slot = Arc<Mutex<Option<oneshot::Sender<Decision>>>>;

pub fn resolution_channel() -> (ResolutionChannel, ResolutionHandle) {
    let slot: Slot = Arc::new(Mutex::new(None));
    (
        ResolutionChannel {
            slot: slot.clone(),
            timeout: None,
            search_timeout: ConverterConfig::default().search_timeout,
        },
        ResolutionHandle { slot },
    )
}

pub struct ResolutionChannel {
    slot: Slot,
    timeout: Option<Duration>,
    search_timeout: Duration,
}

#[derive(Clone)]
pub struct ResolutionHandle {
    slot: Slot,
}

impl ResolutionHandle {
    pub async fn respond(&self, decision: Decision) -> Result<()> {
        let responder = self
            .slot
            .lock()
            .await
            .take()
            .ok_or(ConvertError::NoPendingRequest)?;
        // the waiting side gave up (timeout or cancellation) in the meantime
        responder
            .send(decision)
            .map_err(|_| ConvertError::NoPendingRequest)
    }

    pub async fn select(&self, candidate_id: impl Into<String>) -> Result<()> {
        self.respond(Decision::Select(candidate_id.into())).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.respond(Decision::Skip).await
    }

    pub async fn search(&self, query: impl Into<String>) -> Result<()> {
        self.respond(Decision::Search(query.into())).await
    }

    pub async fn is_pending(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

impl ResolutionChannel {
    /// `None` waits for a decision indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit for each free-text search the user asks for.
    pub fn with_search_timeout(mut self, limit: Duration) -> Self {
        self.search_timeout = limit;
        self
    }

    /// Publishes one request and waits for its single answer.
    pub async fn request(
        &self,
        sink: &dyn ProgressSink,
        track: &Track,
        candidates: &[MatchCandidate],
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock().await = Some(tx);

        sink.emit(ConversionEvent::ManualSelectionRequest {
            track: track.clone(),
            candidates: candidates.to_vec(),
        });

        let answer = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, rx)
                    .await
                    .map_err(|_| ConvertError::ResolutionTimeout)?
                    .map_err(|_| ConvertError::ResolutionClosed),
                None => rx.await.map_err(|_| ConvertError::ResolutionClosed),
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
            decision = answer => decision,
        };

        // drop an unanswered responder so late answers are refused
        self.slot.lock().await.take();
        if matches!(result, Err(ConvertError::ResolutionTimeout)) {
            sink.emit(ConversionEvent::ManualSelectionExpired {
                track: track.clone(),
            });
        }
        result
    }

    /// Runs the manual loop for one track until a candidate is chosen, the
    /// track is skipped, or the wait times out.
    pub async fn resolve(
        &self,
        sink: &dyn ProgressSink,
        destination: &dyn CatalogClient,
        source: &Track,
        candidates: Vec<MatchCandidate>,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome> {
        let mut offered = candidates;

        loop {
            let decision = match self.request(sink, source, &offered, cancel).await {
                Ok(decision) => decision,
                Err(ConvertError::ResolutionTimeout) => {
                    warn!("No decision for '{}' before timeout, skipping", source.title);
                    return Ok(ConversionOutcome::Skipped {
                        reason: SkipReason::ResolutionTimedOut,
                    });
                }
                Err(e) => return Err(e),
            };

            match decision {
                Decision::Skip => {
                    info!("User skipped '{}'", source.title);
                    return Ok(ConversionOutcome::Skipped {
                        reason: SkipReason::UserSkipped,
                    });
                }
                Decision::Select(id) => {
                    if let Some(candidate) = offered.iter().find(|c| c.track.id == id) {
                        info!(
                            "User matched '{}' to '{}' ({})",
                            source.title, candidate.track.title, candidate.track.id
                        );
                        return Ok(ConversionOutcome::Matched {
                            candidate: candidate.clone(),
                        });
                    }
                    warn!("Selected id {} was not offered for '{}'", id, source.title);
                }
                Decision::Search(query) => {
                    debug!("Manual search for '{}': {}", source.title, query);
                    let search = catalog::search_bounded(
                        destination,
                        &query,
                        "",
                        "",
                        self.search_timeout,
                        cancel,
                    )
                    .await;
                    match search {
                        Ok(results) => offered = matching::score_all(source, results),
                        Err(ConvertError::Cancelled) => return Err(ConvertError::Cancelled),
                        Err(e) => warn!("Manual search '{}' failed: {}", query, e),
                    }
                }
            }
        }
    }
}
