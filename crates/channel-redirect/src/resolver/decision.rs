//! Redirect decision: channel lookup, candidate validation, fast path, race.

use thiserror::Error;

use super::race::{Prober, RaceOutcome};
use crate::directory::DirectorySnapshot;

/// Where a resolved channel should redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub url: String,
    pub resolved_by: ResolvedBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// Exactly one valid candidate; no probe was sent.
    FastPath,
    /// Won a race among two or more valid candidates.
    Race,
}

/// Terminal failures of a resolution. Individual probe failures never
/// surface here; they are absorbed by the race.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("channel {0} has no valid stream source")]
    NoValidSources(String),

    #[error("all {candidates} stream sources of channel {channel_id} are down")]
    AllSourcesDown { channel_id: String, candidates: usize },
}

impl ResolveError {
    /// Short label used for span fields and stats.
    pub fn outcome(&self) -> &'static str {
        match self {
            ResolveError::ChannelNotFound(_) => "not_found",
            ResolveError::NoValidSources(_) => "no_valid_sources",
            ResolveError::AllSourcesDown { .. } => "all_sources_down",
        }
    }
}

/// Keep only candidates whose scheme is `http` or `https`. Order and
/// duplicates are preserved.
pub fn valid_candidates(urls: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|url| {
            reqwest::Url::parse(url)
                .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Resolve `channel_id` against `snapshot` to a single redirect target.
///
/// A channel without any URL field is reported as not found. One valid
/// candidate is returned immediately; two or more are raced with the
/// prober's per-probe budget.
pub async fn resolve(
    channel_id: &str,
    snapshot: &DirectorySnapshot,
    prober: &Prober,
) -> Result<RedirectTarget, ResolveError> {
    let urls = snapshot
        .lookup(channel_id)
        .and_then(|channel| channel.urls.as_deref())
        .ok_or_else(|| ResolveError::ChannelNotFound(channel_id.to_string()))?;

    let candidates = valid_candidates(urls);
    tracing::Span::current().record("candidates", candidates.len());

    match candidates.as_slice() {
        [] => Err(ResolveError::NoValidSources(channel_id.to_string())),
        [only] => Ok(RedirectTarget {
            url: only.clone(),
            resolved_by: ResolvedBy::FastPath,
        }),
        _ => match prober.resolve_fastest(&candidates, prober.timeout()).await {
            RaceOutcome::Winner(url) => Ok(RedirectTarget {
                url,
                resolved_by: ResolvedBy::Race,
            }),
            RaceOutcome::Failure => Err(ResolveError::AllSourcesDown {
                channel_id: channel_id.to_string(),
                candidates: candidates.len(),
            }),
        },
    }
}
