//! call-router command line.
//!
//! ```text
//! call-router check <config>                 validate and print the app layout
//! call-router match <config> -H key=value    preview dispatch for a metadata set
//! call-router run <config>                   JSON lines in on stdin, commands out on stdout
//! ```

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use call_router::config::{load_config, ConfigError, ConfigWatcher, ObservabilityConfig, RoutingConfig};
use call_router::lifecycle::{shutdown_signal, Shutdown};
use call_router::observability::{logging, metrics};
use call_router::session::{ChannelControl, Metadata};
use call_router::{InboundEvent, Service};

#[derive(Parser)]
#[command(name = "call-router")]
#[command(about = "Route incoming calls to handlers by signaling metadata", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print its apps and routers
    Check { config: PathBuf },
    /// Show which router and routes a call with the given headers would hit
    Match {
        config: PathBuf,
        /// Call header as key=value; repeatable
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Run the router against a JSON-lines event stream on stdin
    Run { config: PathBuf },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Match { config, headers } => preview(&config, headers.into_iter().collect()),
        Commands::Run { config } => run(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(path: &Path) -> Result<RoutingConfig, ConfigError> {
    let config = load_config(path)?;
    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("warning: logging not initialized: {}", e);
    }
    Ok(config)
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(path)?;
    let composer = config.build_composer()?;

    println!("{}: ok", path.display());
    for app_id in composer.app_ids() {
        let marker = if app_id == composer.default_app() { " (default)" } else { "" };
        println!("app {}{}", app_id, marker);
        for router in composer.routers(app_id).unwrap_or_default() {
            let guards: Vec<String> = router.guards().iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!(
                "  router {} guards=[{}] on_guard_fail={} routes={}",
                router.name(),
                guards.join(", "),
                if router.reject_on_guard() { router.reject_code().to_string() } else { "pass".to_string() },
                router.table().len()
            );
            for route in router.table().iter() {
                println!("    {} {} ~ /{}/", route.name(), route.field(), route.pattern().as_str());
            }
        }
    }
    Ok(())
}

fn preview(path: &Path, metadata: Metadata) -> Result<(), Box<dyn std::error::Error>> {
    let composer = load(path)?.build_composer()?;
    let plan = composer.plan(&metadata);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(&path)?;
    init_metrics(&config.observability);

    tracing::info!(config = ?path, "call-router v{} starting", env!("CARGO_PKG_VERSION"));

    let (control, mut commands) = ChannelControl::new();
    let service = Arc::new(Service::from_config(&config, Arc::new(control))?);

    // stdin is read on a plain thread so a blocked read never holds up exit
    let (events_tx, events_rx) = mpsc::channel(1024);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundEvent>(&line) {
                Ok(event) => {
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, line = %line, "Ignoring malformed event"),
            }
        }
    });

    let writer = tokio::spawn(async move {
        let stdout = std::io::stdout();
        while let Some(outbound) = commands.recv().await {
            let line = match serde_json::to_string(&outbound) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode command");
                    continue;
                }
            };
            let mut out = stdout.lock();
            if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                tracing::error!(error = %e, "Failed to write command");
                break;
            }
        }
    });

    let (watcher, mut updates) = ConfigWatcher::new(&path);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };
    let reload = {
        let service = service.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                if let Err(e) = service.apply_config(&config) {
                    tracing::error!(error = %e, "Failed to apply reloaded config");
                }
            }
        })
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.trigger();
        });
    }

    service.clone().run(events_rx, &shutdown).await;

    reload.abort();
    drop(service);
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "Command writer failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_metrics(config: &ObservabilityConfig) {
    if !config.metrics_enabled {
        return;
    }
    match config.metrics_address.parse() {
        Ok(addr) => metrics::init_metrics(addr),
        Err(_) => tracing::error!(
            metrics_address = %config.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}
