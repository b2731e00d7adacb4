mod api;
mod cache;
mod chat;
mod cms;
mod config;
mod normalize;
mod prompt;

use crate::api::AppState;
use crate::config::Config;
use anyhow::Context;
use dotenvy::Error as DotenvError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_files();
    configure_tracing();

    let config = Config::from_env()?;
    if !config.has_webflow() {
        warn!(
            target: "cms",
            msg = "WEBFLOW_API_TOKEN or WEBFLOW_SITE_ID not set; hotel cache stays empty"
        );
    }
    if !config.has_claude() {
        warn!(target: "chat", msg = "ANTHROPIC_API_KEY not set; /api/chat will answer 500");
    }
    let addr = config.addr;
    let static_dir = config.static_dir.clone();
    let model = config.claude_model.clone();
    let state = AppState::from_config(config)?;

    if state.config.has_webflow() {
        let cache = Arc::clone(&state.cache);
        tokio::spawn(async move {
            // Failures are logged inside refresh; the next stale check retries.
            let _ = cache.refresh().await;
        });
    }

    let router = api::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind TCP listener")?;
    let bound = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(
        listening = %bound,
        model = model.as_str(),
        static_dir = %static_dir.display(),
        commit = option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
        msg = "server ready"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("msg" = "shutdown signal received");
}

fn configure_tracing() {
    let default_filter = "info";
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn load_env_files() {
    fn load(file: &str) {
        match dotenvy::from_filename(file) {
            Ok(_) => {}
            Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => eprintln!("Warning: unable to load {file}: {err}"),
        }
    }

    load(".env.local");
    load(".env");
}
