//! Mooring - container network watchdog
//!
//! A sidecar that keeps compose containers running and attached to the
//! networks they need, restarting and reattaching them when they drift.

mod cli;
mod compose;
mod error;
mod heartbeat;
mod manifest;
mod retry;
mod runtime;
mod settings;
mod sickbay;
mod warden;

use cli::{Cli, Commands};
use error::{Error, Result};
use settings::Settings;

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.subcommand() {
        Commands::Completion { shell } => {
            Cli::generate_completion(*shell);
            Ok(())
        }
        Commands::Watch => {
            init_tracing(cli.verbose);
            watch(&cli, Settings::from_env()?)
        }
        Commands::Check { json } => {
            init_tracing(cli.verbose);
            check(&cli, &Settings::from_env()?, *json)
        }
        Commands::Derive { stdout } => {
            init_tracing(cli.verbose);
            derive(&cli, &Settings::from_env()?, *stdout)
        }
    }
}

/// Initialize logging; `RUST_LOG` overrides the level, `LOG_FORMAT` the layout
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        "compact" => registry.with(fmt::layer().compact()).try_init(),
        _ => registry.with(fmt::layer()).try_init(),
    };

    if let Err(e) = result {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
}

/// Run the supervisor until SIGINT or SIGTERM
fn watch(cli: &Cli, settings: Settings) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            manifest = %cli.config.display(),
            "Mooring starting"
        );

        let docker = Arc::new(runtime::DockerRuntime::connect(&settings)?);
        let warden = warden::Warden::new(docker, &settings);
        let cancel = warden.cancellation();

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            warden::shutdown_signal().await;
            on_signal.cancel();
        });

        let manifest = match manifest::acquire(&cli.sources(), &settings, &cancel).await {
            Ok(manifest) => manifest,
            Err(Error::Interrupted) => {
                info!("Shutdown requested before the manifest was loaded");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        info!(
            containers = manifest.containers.len(),
            watched = manifest.active().count(),
            "Manifest loaded"
        );

        let finished = warden.run(&manifest).await;
        info!(tasks = finished.len(), "Mooring stopped");
        Ok(())
    })
}

/// Load the manifest once and print what would be watched
fn check(cli: &Cli, settings: &Settings, json: bool) -> Result<()> {
    let manifest = manifest::acquire_once(&cli.sources(), settings)?;

    if json {
        let containers: Vec<serde_json::Value> = manifest
            .containers
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "networks": c.networks,
                    "watched": !c.networks.is_empty(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&containers)?);
        return Ok(());
    }

    println!("{:<30} NETWORKS", "CONTAINER");
    println!("{}", "-".repeat(60));
    for container in &manifest.containers {
        let networks = if container.networks.is_empty() {
            "(none, not watched)".to_string()
        } else {
            container.networks.join(", ")
        };
        println!("{:<30} {}", container.name, networks);
    }

    if manifest.active().next().is_none() {
        warn!("No container has required networks; watch would idle");
    }
    println!("\nConfiguration is valid.");
    Ok(())
}

/// Derive the manifest from the compose file
fn derive(cli: &Cli, settings: &Settings, stdout: bool) -> Result<()> {
    if stdout {
        let manifest = compose::derive(&cli.compose, &cli.env_file, &settings.network_pattern)?;
        print!("{}", manifest.to_yaml()?);
        return Ok(());
    }

    let manifest = compose::derive_to_file(
        &cli.compose,
        &cli.env_file,
        &settings.network_pattern,
        &cli.config,
    )?;
    println!(
        "Wrote {} container(s) to {}",
        manifest.containers.len(),
        cli.config.display()
    );
    Ok(())
}
