//! Span builder helpers for channel-redirect instrumentation.

/// Create the top-level span for one channel resolution request.
///
/// Usage: `let span = resolve_request_span!(request_id, channel_id);`
///
/// Fields recorded later by the handler:
/// - `outcome`: `redirect`, `not_found`, `no_valid_sources` or `all_sources_down`
/// - `candidates`: number of valid candidate URLs
/// - `latency_ms`: wall time spent resolving
#[macro_export]
macro_rules! resolve_request_span {
    ($request_id:expr, $channel_id:expr) => {
        tracing::info_span!(
            "resolve_request",
            request_id = %$request_id,
            channel_id = %$channel_id,
            outcome = tracing::field::Empty,
            candidates = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a span covering one race across all candidates.
#[macro_export]
macro_rules! race_span {
    ($candidates:expr, $timeout_ms:expr) => {
        tracing::info_span!(
            "race",
            candidates = $candidates,
            probe_timeout_ms = $timeout_ms,
            winner = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a span for a single candidate probe.
#[macro_export]
macro_rules! probe_span {
    ($url:expr) => {
        tracing::debug_span!(
            "probe",
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
