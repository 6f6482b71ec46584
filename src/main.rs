//! osark agent CLI
//!
//! Samples host state through osquery and ships it to an osark server.

use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use osark_agent::{
    sink::device_id, AgentConfig, HostInfoSource, HttpSink, OsqueryClient, Pipeline,
    DATA_DISCLOSURE, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "osark")]
#[command(version = VERSION)]
#[command(about = "Host telemetry agent for the osark server", long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until interrupted
    Run(RunArgs),

    /// Show the effective configuration
    Config,

    /// Query and print system information and the derived device id
    SystemInfo,

    /// List installed apps and which ones would be tracked
    Apps,

    /// Display what data the agent sends
    Disclosure,
}

#[derive(Args)]
struct RunArgs {
    /// osark server URL
    #[arg(long, env = "OSARK_SERVER_URL")]
    server_url: Option<String>,

    /// Directory for log files
    #[arg(long, env = "OSARK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Events per batch before an immediate flush
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds between host samples
    #[arg(long)]
    sample_interval: Option<u64>,

    /// Seconds between flushes of a partial batch
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Path to the osqueryi binary
    #[arg(long)]
    osquery: Option<PathBuf>,

    /// Log to stdout only
    #[arg(long)]
    no_log_file: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(secs) = self.sample_interval {
            config.sample_interval_secs = secs;
        }
        if let Some(secs) = self.flush_interval {
            config.flush_interval_secs = secs;
        }
        if let Some(path) = &self.osquery {
            config.osquery.binary = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(AgentConfig::config_path);

    match cli.command {
        Commands::Run(args) => cmd_run(&config_path, args).await,
        Commands::Config => cmd_config(&config_path),
        Commands::SystemInfo => cmd_system_info(&config_path).await,
        Commands::Apps => cmd_apps(&config_path).await,
        Commands::Disclosure => {
            println!("{DATA_DISCLOSURE}");
            Ok(())
        }
    }
}

async fn cmd_run(config_path: &Path, args: RunArgs) -> anyhow::Result<()> {
    let mut config = AgentConfig::load_from(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let log_file = init_logging(&config.log_dir, !args.no_log_file)?;
    info!(version = VERSION, log_file = ?log_file, "osark agent starting");

    let source = Arc::new(
        OsqueryClient::new(config.osquery_config()).context("failed to create osquery client")?,
    );
    info!(binary = %source.binary().display(), "using osquery");

    let system_info = source
        .system_info()
        .await
        .context("failed to get system info")?;
    let sink = Arc::new(
        HttpSink::new(config.server(), &system_info).context("failed to create event sink")?,
    );
    info!(
        server = %config.server_url,
        device_id = sink.device_id(),
        "delivering events"
    );

    let mut pipeline = Pipeline::new(config.pipeline(), source, sink)?;
    let stats = pipeline.stats();
    pipeline.start()?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = pipeline.wait() => warn!("pipeline exited on its own"),
    }

    info!("initiating graceful shutdown");
    match pipeline.stop(config.shutdown_timeout()).await {
        Ok(()) => info!("graceful shutdown completed"),
        Err(e) => warn!(error = %e, "graceful shutdown did not complete, forcing exit"),
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_config(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::load_from(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    if !config_path.exists() {
        println!("(not found, showing defaults)");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {e}");
    }
    Ok(())
}

async fn cmd_system_info(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::load_from(config_path)?;
    let source = OsqueryClient::new(config.osquery_config())?;
    let info = source.system_info().await?;

    println!("System Information");
    println!("==================");
    println!();
    println!("  OS: {} {} ({})", info.os_name, info.os_version, info.os_arch);
    println!("  Uptime: {}s", info.uptime_seconds);
    println!("  MAC address: {}", info.mac_address);
    println!("  osquery: {} ({:?})", info.osquery_version, source.binary());
    println!();
    println!("Device ID: {}", device_id(&info));
    Ok(())
}

async fn cmd_apps(config_path: &Path) -> anyhow::Result<()> {
    let config = AgentConfig::load_from(config_path)?;
    let source = OsqueryClient::new(config.osquery_config())?;
    let apps = source.app_inventory().await?;
    let tracked = config.tracking.select(&apps);

    println!("Found {} app(s), {} tracked", apps.len(), tracked.len());
    println!();
    for app in &apps {
        let marker = if tracked.contains(&app.bundle_id) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<40} {:<50} {}",
            app.name, app.bundle_id, app.bundle_version
        );
    }
    Ok(())
}

/// Log to stdout and, unless disabled, a timestamped file in `log_dir`.
fn init_logging(log_dir: &Path, to_file: bool) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false);

    if !to_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout)
            .init();
        return Ok(None);
    }

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {log_dir:?}"))?;
    let path = log_dir.join(format!(
        "osark_{}.log",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create log file {path:?}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(Some(path))
}

/// Resolve on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}
