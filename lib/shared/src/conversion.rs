use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Track;

/// A destination track offered as a match, with the number of fields
/// (title, first artist, album) it shares with the source track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub track: Track,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NoCandidates,
    AutoSkipped,
    UserSkipped,
    ResolutionTimedOut,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoCandidates => "no candidates",
            SkipReason::AutoSkipped => "ambiguous, auto-skip",
            SkipReason::UserSkipped => "user skipped",
            SkipReason::ResolutionTimedOut => "no decision before timeout",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversionOutcome {
    Matched { candidate: MatchCandidate },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

impl ConversionOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, ConversionOutcome::Matched { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ConversionOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConversionOutcome::Failed { .. })
    }

    /// Short human-readable note used in progress events.
    pub fn note(&self) -> String {
        match self {
            ConversionOutcome::Matched { candidate } => format!(
                "matched {} - {}",
                candidate.track.title,
                candidate.track.artist_display()
            ),
            ConversionOutcome::Skipped { reason } => format!("skipped: {reason}"),
            ConversionOutcome::Failed { reason } => format!("failed: {reason}"),
        }
    }
}

/// How the orchestrator treats tracks that have candidates but no auto-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmbiguityPolicy {
    #[default]
    Interactive,
    SkipAmbiguous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Provisioning,
    Running,
    Finalizing,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed(_) | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEntry {
    pub original: Track,
    pub matched: Track,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    pub original: Track,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    pub original: Track,
    pub reason: String,
}

/// Final three-way partition of a conversion. `unwritten` lists accepted
/// tracks the destination still did not show after the write was verified.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub destination_id: Option<String>,
    pub matched: Vec<MatchedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub failed: Vec<FailedEntry>,
    #[serde(default)]
    pub unwritten: Vec<Track>,
}

impl ConversionSummary {
    /// Pairs each source track with its outcome. Extra tracks without an
    /// outcome (a job stopped early) are left out.
    pub fn from_outcomes(sources: &[Track], outcomes: &[ConversionOutcome]) -> Self {
        let mut summary = Self::default();
        for (original, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                ConversionOutcome::Matched { candidate } => summary.matched.push(MatchedEntry {
                    original: original.clone(),
                    matched: candidate.track.clone(),
                    score: candidate.score,
                }),
                ConversionOutcome::Skipped { reason } => summary.skipped.push(SkippedEntry {
                    original: original.clone(),
                    reason: *reason,
                }),
                ConversionOutcome::Failed { reason } => summary.failed.push(FailedEntry {
                    original: original.clone(),
                    reason: reason.clone(),
                }),
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.matched.len() + self.skipped.len() + self.failed.len()
    }
}

/// Events pushed to whoever drives a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConversionEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        percent: u8,
        current_track: Option<Track>,
        note: String,
    },
    #[serde(rename_all = "camelCase")]
    ManualSelectionRequest {
        track: Track,
        candidates: Vec<MatchCandidate>,
    },
    /// The pending request for `track` went unanswered and was withdrawn.
    ManualSelectionExpired { track: Track },
    Completed { summary: ConversionSummary },
    Failed { reason: String },
}
