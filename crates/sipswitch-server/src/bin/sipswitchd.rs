//! `sipswitchd` — the registrar/stateful-proxy daemon. Loads
//! configuration, binds the UDP and TCP listeners, and runs the dispatch
//! loop and session-timer consumer until `SIGINT`/`SIGTERM`, at which
//! point it stops accepting new traffic and gives outstanding
//! transactions up to 30s to terminate before exiting (spec §5
//! "Graceful shutdown").

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use sipswitch_infra::{setup_logging, LoggingConfig, ServerConfig, ShutdownHandle};
use sipswitch_server::context::ServerContext;
use sipswitch_server::{dispatch, session_timer_task};

#[derive(Parser, Debug)]
#[command(name = "sipswitchd", author, version, about = "SIP registrar and stateful proxy", long_about = None)]
struct Args {
    /// Path to a TOML configuration file; built-in defaults are used for
    /// anything it omits (spec §6).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.udp_port` / `server.tcp_port` from the config
    /// file (0 = OS-assigned, handy for tests).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.udp_port = port;
        config.server.tcp_port = port;
    }
    config.validate()?;

    setup_logging(LoggingConfig::new(LoggingConfig::level_from_str(&config.logging.level), "sipswitchd"))
        .unwrap_or_else(|e| eprintln!("logging already initialized: {e}"));

    info!(
        udp_port = config.server.udp_port,
        tcp_port = config.server.tcp_port,
        realm = %config.authentication.realm,
        "starting sipswitchd"
    );

    let (ctx, transport_events, session_events) = ServerContext::build(config).await?;

    let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();

    let dispatch_task = tokio::spawn(dispatch::run(ctx.clone(), transport_events, shutdown_signal.clone()));
    let session_task = tokio::spawn(session_timer_task::run(session_events, shutdown_signal.clone()));

    wait_for_termination().await;
    info!("shutdown signal received, stopping new traffic");
    ctx.transport.shutdown();
    shutdown_handle.trigger();

    let grace = tokio::time::Duration::from_secs(30);
    if tokio::time::timeout(grace, async {
        let _ = dispatch_task.await;
        let _ = session_task.await;
    })
    .await
    .is_err()
    {
        warn!("outstanding work did not finish within the shutdown grace period, forcing exit");
    }

    info!("sipswitchd stopped");
    Ok(())
}

/// Resolves on `SIGINT` everywhere, and additionally on `SIGTERM` where
/// the platform supports it (every target this binary ships for).
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, falling back to SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
