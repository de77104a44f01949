#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use subsmith::cli::{Args, Command};
use subsmith::filter::{AllowList, TargetClient};
use subsmith::helpers::{expand_tilde, load_text};
use subsmith::parser::parse_subscription;
use subsmith::probe::{Probe, ProbeOutcome, ProbeTarget, TcpProbe};
use subsmith::server::{AppState, router, serve};
use subsmith::service::{OutputFormat, render_document};
use subsmith::settings::Settings;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let default_level = if args.verbose { "trace" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Serve { config, listen } => run_serve(config.as_deref(), listen).await,
        Command::Convert {
            input,
            format,
            core,
            output,
        } => run_convert(&input, format, core, output.as_deref()).await,
        Command::Probe { input, timeout_ms } => run_probe(&input, timeout_ms).await,
    }
}

async fn run_serve(
    config: Option<&str>,
    listen: Option<std::net::SocketAddr>,
) -> anyhow::Result<()> {
    let mut settings = match config {
        Some(path) => {
            tracing::info!("Loading settings from: {}", path);
            Settings::load(path).await?
        }
        None => Settings::default(),
    };
    if let Some(listen) = listen {
        settings.listen = listen;
    }

    let state = AppState::from_settings(&settings)?;
    let app = router(state, &settings.allowed_origins);
    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen))?;

    serve(listener, app).await
}

async fn run_convert(
    input: &str,
    format: OutputFormat,
    core: TargetClient,
    output: Option<&str>,
) -> anyhow::Result<()> {
    let content = load_text(input).await?;
    let descriptors = parse_subscription(&content);
    tracing::info!("Parsed {} proxies from {}", descriptors.len(), input);

    let document = render_document(&descriptors, format, core, &AllowList::default())
        .with_context(|| format!("Failed to render {} document for {}", format, core))?;

    match output {
        Some(path) => {
            let path = expand_tilde(path);
            tokio::fs::write(&path, document.body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {} document to {}", format, path.display());
        }
        None => println!("{}", document.body),
    }
    Ok(())
}

async fn run_probe(input: &str, timeout_ms: u64) -> anyhow::Result<()> {
    let content = load_text(input).await?;
    let descriptors = parse_subscription(&content);
    let probe = TcpProbe::new(Duration::from_millis(timeout_ms))?;

    for descriptor in &descriptors {
        let Some(target) = ProbeTarget::from_descriptor(descriptor) else {
            println!("{:<32} {:>8}", descriptor.name, "skipped (QUIC)");
            continue;
        };
        match probe.probe(&target).await {
            ProbeOutcome::Reachable { latency_ms } => {
                println!("{:<32} {:>6} ms", descriptor.name, latency_ms);
            }
            ProbeOutcome::Failed { error } => {
                println!("{:<32} failed: {}", descriptor.name, error);
            }
        }
    }
    Ok(())
}
