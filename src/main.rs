use anyhow::{Context, Result};
use borghi_sync::{
    BorghiConfig, BorghiOrchestrator, DrainAttempt, MockUploader, Position, RegistryImporter,
    SysfsBatteryProbe, TcpReachabilityProbe,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "borghi")]
#[command(about = "Offline capture queue and sync daemon for the Borghi village app")]
#[command(version)]
#[command(long_about = "Queues geotagged village photos on the device, credits each shot to \
the village the camera points at, and uploads the queue when network and battery allow.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "borghi.toml", global = true)]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log output format: json, pretty, or compact
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    /// Also write daily-rotated log files to this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync daemon until SIGINT or SIGTERM
    Run {
        /// Initialize components but don't start them
        #[arg(long)]
        dry_run: bool,
    },
    /// Queue a photo for the village at the given position
    Capture {
        /// Photo produced by the camera; moved into the queue
        #[arg(long)]
        photo: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Compass heading in degrees; without it the nearest village is used
        #[arg(long)]
        heading: Option<f64>,
    },
    /// List queued shots
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a queued shot and its photo
    Remove { id: String },
    /// Run one gated drain of the queue
    Drain {
        /// Upload with a mock uploader instead of the outbox
        #[arg(long)]
        mock: bool,
    },
    /// Convert raw regional datasets into the normalized registry
    ImportRegistry {
        #[arg(long)]
        raw_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Validate the configuration file and exit
    ValidateConfig,
    /// Print the default configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::PrintConfig = args.command {
        print!("{}", toml::to_string_pretty(&BorghiConfig::default())?);
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Borghi v{}", env!("CARGO_PKG_VERSION"));

    if let Command::ImportRegistry { raw_dir, out } = &args.command {
        let villages = RegistryImporter::import_dir(raw_dir).await?;
        RegistryImporter::write_registry(out, &villages).await?;
        println!("Wrote {} villages to {}", villages.len(), out.display());
        return Ok(());
    }

    let config = BorghiConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    if let Command::ValidateConfig = args.command {
        return match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                Ok(())
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        };
    }
    config.validate()?;

    match args.command {
        Command::Run { dry_run } => run_daemon(config, dry_run).await,
        Command::Capture {
            photo,
            lat,
            lng,
            heading,
        } => {
            let orchestrator = BorghiOrchestrator::new(config).await?;
            let position = Position::new(lat, lng);
            let (_position_tx, position_rx) = watch::channel(Some(position));
            let (_heading_tx, heading_rx) = watch::channel(heading);
            let session = orchestrator.capture_session(position_rx, heading_rx);

            match session.capture_at(&photo, position, heading).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    Ok(())
                }
                Err(e) if e.is_source_missing() => {
                    eprintln!("Photo {} is gone, take it again", photo.display());
                    std::process::exit(2);
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::List { json } => {
            let orchestrator = BorghiOrchestrator::new(config).await?;
            let records = orchestrator.store().list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{}  {:<8} tries={}  {} ({})  {}",
                        r.id,
                        r.status,
                        r.tries,
                        r.village_name,
                        r.village_id,
                        r.last_error.as_deref().unwrap_or("")
                    );
                }
                let stats = orchestrator.store().stats().await?;
                println!(
                    "{} shots: {} pending, {} done, {} failed",
                    stats.total, stats.pending, stats.done, stats.failed
                );
            }
            Ok(())
        }
        Command::Remove { id } => {
            let orchestrator = BorghiOrchestrator::new(config).await?;
            if orchestrator.store().remove(&id).await? {
                println!("Removed {}", id);
            } else {
                println!("No shot with id {}", id);
            }
            Ok(())
        }
        Command::Drain { mock } => {
            let orchestrator = if mock {
                let network = Arc::new(TcpReachabilityProbe::from_config(&config.sync));
                let battery = Arc::new(SysfsBatteryProbe::from_config(&config.sync));
                BorghiOrchestrator::with_components(
                    config,
                    network,
                    battery,
                    Arc::new(MockUploader::new()),
                )
                .await?
            } else {
                BorghiOrchestrator::new(config).await?
            };

            match orchestrator.monitor().try_drain().await {
                DrainAttempt::Completed(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                DrainAttempt::Skipped(reason) => {
                    println!("Drain skipped: {}", reason);
                    Ok(())
                }
                DrainAttempt::Failed(message) => anyhow::bail!("Drain failed: {}", message),
            }
        }
        Command::ImportRegistry { .. } | Command::ValidateConfig | Command::PrintConfig => Ok(()),
    }
}

async fn run_daemon(config: BorghiConfig, dry_run: bool) -> Result<()> {
    let mut orchestrator = BorghiOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await?;

    if dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Borghi exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("borghi={0},borghi_sync={0}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "borghi.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
