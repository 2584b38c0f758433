//! First-live-mirror race.
//!
//! Every candidate is probed concurrently with an HTTP GET. The first probe
//! to see a 2xx response wins; the shared cancellation token is then fired
//! and the remaining probes are dropped. Which mirror wins is decided purely
//! by who answers first, never by position in the candidate list.

use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ProbeConfig;

/// Result of one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Winner(String),
    /// No candidate answered with a 2xx within its probe budget.
    Failure,
}

/// Issues liveness probes. Cheap to clone (the client is shared).
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
}

impl Prober {
    /// Build a prober with its own client: browser User-Agent, no Referer.
    pub fn new(config: &ProbeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .referer(false)
            .build()?;
        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    /// Default per-probe budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Race all candidates and return the first live one.
    ///
    /// An empty list fails without probing. A single candidate is returned
    /// as-is without probing: there is nothing to race against, so its
    /// liveness is not checked. Duplicates are probed independently.
    pub async fn resolve_fastest(
        &self,
        candidates: &[String],
        per_probe_timeout: Duration,
    ) -> RaceOutcome {
        match candidates {
            [] => return RaceOutcome::Failure,
            [only] => return RaceOutcome::Winner(only.clone()),
            _ => {}
        }

        let span = redirect_tracing::race_span!(
            candidates.len(),
            per_probe_timeout.as_millis() as u64
        );

        async {
            let start = Instant::now();
            let cancel = CancellationToken::new();
            let mut probes = JoinSet::new();

            for url in candidates {
                let prober = self.clone();
                let cancel = cancel.clone();
                let url = url.clone();
                probes.spawn(
                    async move {
                        let live = prober.probe(&url, per_probe_timeout, &cancel).await;
                        live.then_some(url)
                    }
                    .in_current_span(),
                );
            }

            while let Some(joined) = probes.join_next().await {
                match joined {
                    Ok(Some(winner)) => {
                        // Stop the losers; dropping the set aborts their tasks.
                        cancel.cancel();
                        let latency = start.elapsed().as_millis() as u64;
                        tracing::Span::current().record("winner", winner.as_str());
                        tracing::Span::current().record("latency_ms", latency);
                        tracing::info!(winner = %winner, latency_ms = latency, "Race won");
                        return RaceOutcome::Winner(winner);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Probe task failed");
                    }
                }
            }

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);
            tracing::warn!(latency_ms = latency, "Every candidate failed its probe");
            RaceOutcome::Failure
        }
        .instrument(span)
        .await
    }

    /// Probe one candidate: `true` only for a 2xx response within `timeout`.
    ///
    /// Connection errors, non-2xx statuses and timeouts are all plain
    /// failures. Cancellation is checked first and also reports `false`;
    /// the race has already been decided by then.
    async fn probe(&self, url: &str, timeout: Duration, cancel: &CancellationToken) -> bool {
        let span = redirect_tracing::probe_span!(url);

        async {
            let start = Instant::now();

            // Only the response head is awaited; the stream body is never read.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::trace!("Probe cancelled");
                    return false;
                }
                result = tokio::time::timeout(timeout, self.client.get(url).send()) => result,
            };

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);

            match result {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    tracing::Span::current().record("status", status.as_u16());
                    if !status.is_success() {
                        tracing::debug!(status = status.as_u16(), latency_ms = latency, "Probe rejected");
                    }
                    status.is_success()
                }
                Ok(Err(e)) => {
                    tracing::Span::current().record("status", 0_u16);
                    tracing::debug!(error = %e, latency_ms = latency, "Probe failed");
                    false
                }
                Err(_) => {
                    tracing::Span::current().record("status", 0_u16);
                    tracing::debug!(latency_ms = latency, "Probe timed out");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }
}
