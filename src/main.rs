//! Autocorrector CLI
//!
//! Command-line interface for the privileged daemon, the user's client and
//! the single-process mode.

use anyhow::{anyhow, bail, Context, Result};
use autocorrector::channel::{socket_path, SocketOwner};
use autocorrector::correction;
use autocorrector::keyboard::open_system_devices;
use autocorrector::pipeline::{self, Devices};
use autocorrector::stats::{create_shared_stats_with_persistence, UsageStats};
use autocorrector::{logging, Config, Shutdown, VERSION};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autocorrector")]
#[command(version = VERSION)]
#[command(about = "Fixes typos system-wide as you type", long_about = None)]
struct Cli {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the privileged keyboard daemon for a user (needs root)
    Daemon {
        /// Account whose client may connect
        #[arg(long)]
        user: String,

        /// Use noop keyboard devices
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the unprivileged client that checks words for the daemon
    Client {
        /// Corrections file (TOML table of typo = "correction")
        #[arg(long)]
        corrections: Option<PathBuf>,
    },

    /// Run everything in one process
    Standalone {
        /// Corrections file (TOML table of typo = "correction")
        #[arg(long)]
        corrections: Option<PathBuf>,

        /// Use noop keyboard devices
        #[arg(long)]
        dry_run: bool,
    },

    /// Pause corrections
    Pause,

    /// Resume corrections
    Resume,

    /// Show usage statistics
    Stats,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let result = match cli.command {
        Commands::Daemon { user, dry_run } => cmd_daemon(&user, dry_run),
        Commands::Client { corrections } => cmd_client(corrections),
        Commands::Standalone {
            corrections,
            dry_run,
        } => cmd_standalone(corrections, dry_run),
        Commands::Pause => cmd_set_paused(true),
        Commands::Resume => cmd_set_paused(false),
        Commands::Stats => cmd_stats(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    })
}

fn cmd_daemon(user: &str, dry_run: bool) -> Result<()> {
    let is_root = nix::unistd::geteuid().is_root();
    if !is_root && !dry_run {
        bail!("the daemon reads and writes keyboard devices and must run as root");
    }

    let account = nix::unistd::User::from_name(user)
        .with_context(|| format!("looking up user {user:?}"))?
        .ok_or_else(|| anyhow!("unknown user {user:?}"))?;
    // Only root can hand the socket to another account
    let owner = is_root.then(|| SocketOwner {
        uid: account.uid.as_raw(),
        gid: account.gid.as_raw(),
    });

    let (source, injector) = open_system_devices(dry_run).context("opening keyboard devices")?;
    let config = load_config();

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone());

    println!("Autocorrector daemon v{VERSION}");
    println!("Serving user {user} on {:?}", socket_path(user));
    println!("Press Ctrl+C to stop");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(pipeline::run_daemon(
        config,
        socket_path(user),
        owner,
        Devices::new(source, injector),
        shutdown,
    ))?;
    Ok(())
}

fn current_user() -> Result<String> {
    let uid = nix::unistd::getuid();
    nix::unistd::User::from_uid(uid)?
        .map(|u| u.name)
        .or_else(|| std::env::var("USER").ok())
        .ok_or_else(|| anyhow!("cannot determine the current user"))
}

fn cmd_client(corrections: Option<PathBuf>) -> Result<()> {
    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let explicit = corrections.or_else(|| config.corrections_path.clone());
    let corrections = correction::locate(explicit.as_deref())?;
    let user = current_user()?;
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone());

    println!("Autocorrector client v{VERSION}");
    println!("Corrections: {corrections:?}");
    if config.paused {
        println!("Corrections are currently paused.");
        println!("Run `autocorrector resume` to start correcting.");
    }
    println!("Press Ctrl+C to stop");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(pipeline::run_client(
        config,
        Some(Config::config_path()),
        socket_path(&user),
        corrections,
        Some(stats.clone()),
        shutdown,
    ))?;

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_standalone(corrections: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let explicit = corrections.or_else(|| config.corrections_path.clone());
    let corrections = correction::locate(explicit.as_deref())?;
    let (source, injector) = open_system_devices(dry_run).context("opening keyboard devices")?;
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone());

    println!("Autocorrector v{VERSION}");
    println!("Corrections: {corrections:?}");
    println!("Press Ctrl+C to stop");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(pipeline::run_standalone(
        config,
        Some(Config::config_path()),
        corrections,
        Devices::new(source, injector),
        Some(stats.clone()),
        shutdown,
    ))?;

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_set_paused(paused: bool) -> Result<()> {
    let mut config = load_config();
    config.paused = paused;
    config.save()?;

    if paused {
        println!("Corrections paused.");
    } else {
        println!("Corrections resumed.");
    }
    Ok(())
}

fn cmd_stats() -> Result<()> {
    let config = load_config();
    let path = config.stats_path();
    if !path.exists() {
        println!("No statistics recorded yet.");
        return Ok(());
    }

    println!("{}", UsageStats::with_persistence(path).summary());
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(shutdown: Shutdown) {
    ctrlc::set_handler(move || {
        shutdown.trigger();
    })
    .expect("Error setting Ctrl+C handler");
}
