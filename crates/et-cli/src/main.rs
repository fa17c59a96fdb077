//! ecs-tunnel CLI
//!
//! Forwards local ports into an ECS task over session-manager sessions and
//! keeps them open until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecs_tunnel::forward::{self, ForwardRequest};
use ecs_tunnel::output::{format_tunnels, print_error, print_success, print_warning};
use et_core::config::{self, TunnelConfig};
use et_core::traits::ControlPlane;
use et_orchestrator::{AwsControlPlane, EcsTunnel, TunnelOptions};

/// How often the watchdog looks for session processes that went away
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ecs-tunnel")]
#[command(author, version, about = "Forward local ports into AWS ECS tasks")]
struct Cli {
    /// ECS cluster the task runs in
    #[arg(short = 'c', long, value_name = "CLUSTER_NAME")]
    cluster: String,

    /// Task id or ARN
    #[arg(short = 't', long, value_name = "TASK_ID")]
    task: String,

    /// Container name. Required if the task runs more than one container
    #[arg(short = 'n', long, value_name = "CONTAINER_NAME")]
    container: Option<String>,

    /// Forward a local port. With REMOTE_ADDR a netcat supporting "-e PROG"
    /// must be installed in the container
    #[arg(short = 'L', long = "local", value_name = "LOCAL_PORT:[REMOTE_ADDR:]REMOTE_PORT")]
    local: Vec<String>,

    /// Run an HTTP(S) proxy on the given local port. Requires Nmap Ncat in
    /// the container
    #[arg(short = 'H', long = "http-proxy", value_name = "PORT")]
    http_proxy: Vec<u16>,

    /// AWS region
    #[arg(long, value_name = "AWS_REGION")]
    region: Option<String>,

    /// AWS profile name
    #[arg(long, value_name = "AWS_PROFILE_NAME")]
    profile: Option<String>,

    /// aws command line executable [default: aws]
    #[arg(long, value_name = "BIN")]
    aws_exec: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let requests = match forward::parse_forwards(&cli.local, &cli.http_proxy) {
        Ok(requests) => requests,
        Err(e) => {
            println!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    if requests.is_empty() {
        println!("ERROR: no forwards (-L/-H) given");
        return Ok(ExitCode::FAILURE);
    }

    let mut config =
        config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, cli.region, cli.profile, cli.aws_exec);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let control_plane: Arc<dyn ControlPlane> = Arc::new(AwsControlPlane::from_config(&config).await);
    let mut options = TunnelOptions::new(cli.cluster, cli.task).with_config(config);
    if let Some(container) = cli.container {
        options = options.with_container(container);
    }

    let tunnel = EcsTunnel::connect(options, control_plane)
        .await
        .context("Failed to prepare tunnels")?;
    tracing::info!("Session target: {}", tunnel.target());

    if !establish_all(&tunnel, &requests, &cancel).await? {
        close(&tunnel).await?;
        return Ok(ExitCode::FAILURE);
    }

    println!();
    println!("{}", format_tunnels(&tunnel.tunnels()));
    println!("\nPress CTRL-C to stop");

    watch(&tunnel, &cancel).await;

    close(&tunnel).await?;
    print_success("All tunnels closed");
    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(
    config: &mut TunnelConfig,
    region: Option<String>,
    profile: Option<String>,
    aws_exec: Option<String>,
) {
    if region.is_some() {
        config.region = region;
    }
    if profile.is_some() {
        config.profile = profile;
    }
    if let Some(aws_exec) = aws_exec {
        config.aws_exec = aws_exec;
    }
}

/// Open every requested forward in order.
///
/// Returns `Ok(false)` when interrupted. On a failed forward everything
/// opened so far is closed before the error is returned.
async fn establish_all(
    tunnel: &EcsTunnel,
    requests: &[ForwardRequest],
    cancel: &CancellationToken,
) -> Result<bool> {
    for request in requests {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            result = forward::establish(tunnel, request) => result,
        };

        match result {
            Ok(line) => println!("{}", line),
            Err(e) => {
                if let Err(close_err) = tunnel.close().await {
                    print_warning(&close_err.to_string());
                }
                return Err(e).with_context(|| format!("Failed to set up {}", request));
            }
        }
    }
    Ok(true)
}

/// Wait for a shutdown signal, warning when session processes exit
async fn watch(tunnel: &EcsTunnel, cancel: &CancellationToken) {
    let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
    let mut live = tunnel.live_processes();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = tunnel.live_processes();
                if now < live {
                    tracing::warn!("{} session process(es) exited", live - now);
                    print_warning(&format!(
                        "{} of {} session process(es) still running",
                        now,
                        tunnel.tracked_processes()
                    ));
                }
                live = now;
            }
        }
    }
}

async fn close(tunnel: &EcsTunnel) -> Result<()> {
    let report = tunnel.close().await.context("Failed to close tunnels")?;
    tracing::info!(
        "Terminated {} remote session(s) and {} session process(es)",
        report.sessions_terminated,
        report.processes_terminated
    );
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, closing tunnels...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, closing tunnels...");
            }
        }

        cancel.cancel();
    });
}
