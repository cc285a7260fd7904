//! Exact-field matching of destination search results against a source track.

use shared::{catalog::Track, conversion::MatchCandidate};

/// Number of equal fields at which a candidate is accepted without asking.
pub const AUTO_MATCH_THRESHOLD: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NoCandidates,
    AutoMatched(MatchCandidate),
    /// Every candidate, in search order, for someone to choose from.
    Ambiguous(Vec<MatchCandidate>),
}

/// Counts how many of title, first artist and album are exactly equal.
pub fn score(source: &Track, candidate: &Track) -> u8 {
    let title = source.title == candidate.title;
    let artist = match (source.primary_artist(), candidate.primary_artist()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let album = source.album == candidate.album;

    [title, artist, album].into_iter().filter(|eq| *eq).count() as u8
}

pub fn score_all(source: &Track, candidates: Vec<Track>) -> Vec<MatchCandidate> {
    candidates
        .into_iter()
        .map(|track| MatchCandidate {
            score: score(source, &track),
            track,
        })
        .collect()
}

pub fn classify(source: &Track, candidates: Vec<Track>) -> Resolution {
    if candidates.is_empty() {
        return Resolution::NoCandidates;
    }

    let mut scored = score_all(source, candidates);

    // max_by_key keeps the last maximum, so walk backwards to keep the first
    // one in search order.
    let best = scored
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_, c)| c.score)
        .map(|(idx, c)| (idx, c.score));

    match best {
        Some((idx, best_score)) if best_score >= AUTO_MATCH_THRESHOLD => {
            Resolution::AutoMatched(scored.swap_remove(idx))
        }
        _ => Resolution::Ambiguous(scored),
    }
}
