//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::RedirectConfig;
use crate::correlation::{self, REQUEST_ID_HEADER};
use crate::directory::DirectoryLoader;
use crate::playlist::{self, PlaylistContext, REDIRECT_PATH};
use crate::resolver::{self, Prober, RedirectTarget, ResolveError};
use crate::stats::ResolveStats;

const PLAYLIST_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RedirectConfig,
    pub directory: DirectoryLoader,
    pub prober: Prober,
    pub stats: ResolveStats,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(REDIRECT_PATH, get(handle_redirect))
        .route("/api/jptv", get(handle_redirect))
        .route("/m3u", get(handle_m3u))
        .route("/m3u.php", get(handle_m3u))
        .route("/api/m3u", get(handle_m3u))
        .route("/txt", get(handle_txt))
        .route("/txt.php", get(handle_txt))
        .route("/api/txt", get(handle_txt))
        .route("/api/stats", get(handle_get_stats))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "channel-redirect listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("channel-redirect shut down gracefully");
    Ok(())
}

/// First `id` in the query string. A repeated `id` does not reject the request.
fn channel_id(params: &[(String, String)]) -> String {
    params
        .iter()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.clone())
        .unwrap_or_default()
}

/// GET /jptv.php?id=<channel>: resolve the channel and redirect to a live mirror.
///
/// 1. Take a fresh directory snapshot
/// 2. Resolve (fast path or race)
/// 3. 302 with CORS and short cache lifetime, or an explicit failure
async fn handle_redirect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request_id = correlation::generate_id();
    let channel_id = channel_id(&params);
    let span = redirect_tracing::resolve_request_span!(&request_id, &channel_id);

    async {
        let start = Instant::now();
        let snapshot = state.directory.snapshot().await;
        let result = resolver::resolve(&channel_id, &snapshot, &state.prober).await;

        let latency = start.elapsed().as_millis() as u64;
        let span = tracing::Span::current();
        span.record("latency_ms", latency);
        state.stats.record(&result);

        let mut response = match result {
            Ok(target) => {
                span.record("outcome", "redirect");
                tracing::info!(
                    target = %target.url,
                    resolved_by = ?target.resolved_by,
                    latency_ms = latency,
                    "Redirecting"
                );
                redirect_response(&target, state.config.redirect.cache_max_age_secs)
            }
            Err(e) => {
                span.record("outcome", e.outcome());
                tracing::warn!(error = %e, latency_ms = latency, "Resolution failed");
                e.into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// 302 to the winning mirror. Clients and caches may reuse the answer for
/// `max_age_secs`, after which they come back and trigger a fresh race.
fn redirect_response(target: &RedirectTarget, max_age_secs: u64) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, target.url.as_str())
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={max_age_secs}, s-maxage={max_age_secs}"),
        )
        .body(axum::body::Body::empty())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, target = %target.url, "Failed to build redirect");
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid redirect target").into_response()
        })
}

/// Every unsuccessful resolution is a hard failure. "All sources down" is a
/// 503 rather than a redirect to placeholder media.
impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ResolveError::ChannelNotFound(_) => (StatusCode::NOT_FOUND, "Channel Not Found"),
            ResolveError::NoValidSources(_) => (StatusCode::NOT_FOUND, "No valid stream source"),
            ResolveError::AllSourcesDown { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "All streams are down")
            }
        };
        (status, message).into_response()
    }
}

/// Base URL for playlist links: configured value, or `https://{Host}`.
fn public_base_url(config: &RedirectConfig, headers: &HeaderMap) -> String {
    if let Some(base) = &config.server.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("https://{host}")
}

fn playlist_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, PLAYLIST_CACHE_CONTROL),
            (header::CONTENT_TYPE, TEXT_PLAIN_UTF8),
        ],
        body,
    )
        .into_response()
}

/// GET /m3u: M3U playlist of all channels.
async fn handle_m3u(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let snapshot = state.directory.snapshot().await;
    let base_url = public_base_url(&state.config, &headers);
    let ctx = PlaylistContext {
        base_url: &base_url,
        epg_urls: &state.config.playlist.epg_urls,
        logo_base_url: &state.config.directory.logo_base_url,
    };
    playlist_response(playlist::render_m3u(&snapshot, &ctx))
}

/// GET /txt: TXT playlist of all channels.
async fn handle_txt(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let snapshot = state.directory.snapshot().await;
    let base_url = public_base_url(&state.config, &headers);
    let ctx = PlaylistContext {
        base_url: &base_url,
        epg_urls: &state.config.playlist.epg_urls,
        logo_base_url: &state.config.directory.logo_base_url,
    };
    playlist_response(playlist::render_txt(&snapshot, &ctx))
}

/// GET /api/stats: return resolution counters.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.stats.snapshot()).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
