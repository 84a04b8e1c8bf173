//! Shelf CLI - install, run and prune cached Electron runtimes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shelf_core::{Shelf, ShelfConfig, LATEST};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_RETENTION_DAYS: u64 = 100 * 365;

#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(about = "Versioned Electron runtime cache")]
struct Args {
    /// Installation root (defaults to the user data directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Platform identifier override (linux, darwin, win32, ...)
    #[arg(long, global = true, env = "npm_config_platform")]
    platform: Option<String>,

    /// Latest-release endpoint
    #[arg(long, global = true)]
    feed_url: Option<String>,

    /// Base URL archives are downloaded from
    #[arg(long, global = true)]
    download_base: Option<String>,

    /// Days a version may stay unused before `prune` removes it
    #[arg(
        long,
        global = true,
        value_parser = clap::value_parser!(u64).range(0..=MAX_RETENTION_DAYS)
    )]
    retention_days: Option<u64>,

    /// Directory for runtime stdout/stderr logs
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Do not look for a system-wide runtime
    #[arg(long, global = true)]
    no_global: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a version (latest when omitted)
    Install { version: Option<String> },

    /// Check whether a version (latest when omitted) is installed
    Validate { version: Option<String> },

    /// Run a file with a runtime, installing it first if needed
    Run {
        /// Script or app directory handed to the runtime
        file: PathBuf,

        /// Runtime version to use
        #[arg(short = 'r', long = "runtime-version", default_value = LATEST)]
        runtime_version: String,

        /// Arguments passed through to the runtime
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove versions unused for longer than the retention window
    #[command(alias = "remove-unused")]
    Prune,

    /// List installed versions
    List {
        /// Print a JSON array instead of one version per line
        #[arg(long)]
        json: bool,
    },

    /// Print the latest published version
    Latest,
}

impl Args {
    fn config(&self) -> ShelfConfig {
        let mut config = match &self.root {
            Some(root) => ShelfConfig::new(root),
            None => ShelfConfig::default(),
        };
        if let Some(platform) = &self.platform {
            config = config.with_platform(platform);
        }
        if let Some(url) = &self.feed_url {
            config = config.with_release_feed_url(url);
        }
        if let Some(url) = &self.download_base {
            config = config.with_download_base_url(url);
        }
        if let Some(days) = self.retention_days {
            config = config.with_retention_window(Duration::from_secs(days * SECONDS_PER_DAY));
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        if self.no_global {
            config = config.with_global_command(None);
        }
        config
    }
}

fn init_logging(debug: bool) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let log_level = if debug { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(log_level).init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = args.config();
    info!("Installation root: {}", config.install_root.display());

    let shelf = Shelf::new(config)
        .await
        .context("failed to initialize shelf")?;

    let code = match args.command {
        Command::Install { version } => {
            let installed = shelf.install(version.as_deref()).await?;
            println!("{}", installed);
            ExitCode::SUCCESS
        }
        Command::Validate { version } => {
            if shelf.validate(version.as_deref()).await? {
                println!("installed");
                ExitCode::SUCCESS
            } else {
                println!("not installed");
                ExitCode::FAILURE
            }
        }
        Command::Run {
            file,
            runtime_version,
            args,
        } => run(&shelf, file, &runtime_version, &args).await?,
        Command::Prune => {
            for version in shelf.remove_unused_versions().await {
                println!("{}", version);
            }
            ExitCode::SUCCESS
        }
        Command::List { json } => {
            let versions = shelf.installed_versions().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                for version in versions {
                    println!("{}", version);
                }
            }
            ExitCode::SUCCESS
        }
        Command::Latest => {
            println!("{}", shelf.latest().await?);
            ExitCode::SUCCESS
        }
    };

    shelf.flush_usage().await;
    Ok(code)
}

async fn run(shelf: &Shelf, file: PathBuf, version: &str, args: &[String]) -> Result<ExitCode> {
    let Some(process) = shelf.run(&file, version, args).await? else {
        warn!("No runtime executable available for {}", version);
        return Ok(ExitCode::FAILURE);
    };

    let exit = tokio::select! {
        exit = process.wait() => exit,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, stopping runtime");
            process.kill();
            process.wait().await
        }
    };

    info!("Runtime exited with {:?}", exit.code);
    let code = exit
        .code
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1);
    Ok(ExitCode::from(code))
}
