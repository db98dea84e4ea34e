// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use streamlens::config;
use streamlens::proxy;
use streamlens::session::SessionRegistry;
use streamlens::store::ConnectionStore;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "streamlens", about = "Observing reverse proxy for SSE and NDJSON streams")]
struct Cli {
    /// Path to the streamlens.yaml config file
    #[arg(long, default_value = "streamlens.yaml", env = "STREAMLENS_CONFIG")]
    config: String,

    /// Upstream base URL (overrides the config file)
    #[arg(long, env = "STREAMLENS_UPSTREAM")]
    upstream: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "STREAMLENS_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = std::path::Path::new(&cli.config);
    let mut config = if config_path.exists() {
        let source = config::FileSource {
            path: config_path.to_path_buf(),
        };
        match config::load_config(&source) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        // No file: the upstream flag alone is enough to run.
        let Some(upstream) = cli.upstream.clone() else {
            tracing::error!(
                "no config file at {} and no --upstream given",
                config_path.display()
            );
            std::process::exit(1);
        };
        match config::Config::with_upstream(upstream) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("invalid upstream: {e}");
                std::process::exit(1);
            }
        }
    };

    if let Some(upstream) = cli.upstream {
        config.upstream = upstream;
    }
    if let Some(port) = cli.port {
        config.listen_port = port;
    }

    tracing::info!(
        upstream = %config.upstream,
        max_buffer_bytes = config.max_buffer_bytes,
        "config loaded"
    );

    let store = Arc::new(ConnectionStore::new());
    let registry = Arc::new(SessionRegistry::with_max_buffer_bytes(
        store.clone(),
        config.max_buffer_bytes,
    ));
    let upstream: Arc<dyn proxy::UpstreamClient> = Arc::new(proxy::ReqwestUpstreamClient::new(
        reqwest::Client::new(),
        config.upstream.clone(),
    ));

    let app = proxy::build_router(upstream, registry, store, config.tap_channel_capacity);

    // Localhost only, never 0.0.0.0.
    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "streamlens listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
