//! Devkit API server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use devkit::io::config::DevkitConfig;
use devkit::io::context::DevkitContext;
use devkit_api::build_router;
use devkit_api::state::AppState;
use tracing::info;

#[derive(Parser)]
#[command(name = "devkit-api")]
#[command(about = "Local stand-in for the module platform API")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "HLA_DEVKIT_API_PORT", default_value_t = 4100)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    devkit::logging::init("info");
    let args = Args::parse();

    info!("starting devkit api");
    let config = DevkitConfig::from_env().context("load configuration")?;
    let grace = config.shutdown_grace;
    let ctx = Arc::new(DevkitContext::open(config).await.context("start devkit")?);

    let app = build_router(AppState::new(ctx.clone()));
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve")?;

    info!("shutting down devkit api");
    ctx.close().await;
    tokio::time::sleep(grace).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
