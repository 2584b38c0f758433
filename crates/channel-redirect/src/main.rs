//! channel-redirect: resolves a channel id to the first live mirror of its
//! stream and answers with a short-lived redirect.

mod config;
mod correlation;
mod directory;
mod playlist;
mod resolver;
mod server;
mod stats;

#[cfg(test)]
mod test_mirrors;

use config::RedirectConfig;
use directory::DirectoryLoader;
use resolver::Prober;
use server::AppState;
use stats::ResolveStats;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("REDIRECT_CONFIG").ok())
        .unwrap_or_else(|| "channel-redirect.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let mut config = RedirectConfig::load(&config_path)?;
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }

    // The tonic OTLP exporter needs a reactor, so build the runtime first.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = redirect_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            channels_file = %config.directory.channels_file,
            inline_channels = config.directory.channels_data.is_some(),
            probe_timeout_ms = config.probe.timeout_ms,
            otlp_export = tracing_guard.is_exporting(),
            "Starting channel-redirect"
        );

        run(config).await
    })
}

async fn run(config: RedirectConfig) -> anyhow::Result<()> {
    let prober = Prober::new(&config.probe)?;
    let directory = DirectoryLoader::new(config.directory.clone());

    let state = AppState {
        config,
        directory,
        prober,
        stats: ResolveStats::new(),
    };

    server::run(state).await
}
