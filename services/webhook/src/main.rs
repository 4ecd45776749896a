//! kube-lb webhook server
//!
//! Starts listening immediately and installs the broker once the in-cluster
//! Kubernetes client is available; requests arriving earlier get 503.

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kube_lb_webhook::config::Args;
use kube_lb_webhook::{router, AppState, Broker};

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();
    let policy = args.retry_policy();

    info!(
        listen = %args.listen,
        namespace = %args.namespace,
        poll_attempts = policy.attempts,
        poll_interval_ms = policy.interval.as_millis() as u64,
        "Starting kube-lb webhook"
    );
    if policy.max_wait() >= kube_lb_common::DEFAULT_CLIENT_TIMEOUT {
        warn!(
            max_wait_secs = policy.max_wait().as_secs(),
            "Poll budget reaches the agent's default request timeout"
        );
    }

    let state = AppState::pending();

    let init_state = state.clone();
    let namespace = args.namespace.clone();
    tokio::spawn(async move {
        match Client::try_default().await {
            Ok(client) => {
                init_state.install(Broker::from_client(client, &namespace, policy));
                info!("VIP pool initialized");
            }
            Err(e) => {
                error!(error = %e, "Failed to create Kubernetes client");
                std::process::exit(1);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("Webhook listening on {}", args.listen);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server failed")?;

    info!("Webhook stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
