#![allow(missing_docs)]

//! editor-bridge binary.
//!
//! `serve` seeds the workspace kernel, binds the command bridge and pumps
//! newline-delimited JSON frames between stdin/stdout and the bridge.
//! `check-origin` reports whether an origin would be authorized.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use editor_bridge::bridge::CommandBridge;
use editor_bridge::config::Config;
use editor_bridge::frame::run_frames;
use editor_bridge::kernel::directory::DirectoryKernel;
use editor_bridge::kernel::{self, Kernel};
use editor_bridge::lifecycle;
use editor_bridge::logging;
use editor_bridge::transport::Transport;

#[derive(Debug, Parser)]
#[command(name = "editor-bridge", version, about = "Editor command bridge for an app kernel")]
struct Cli {
    /// Path to config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging for this crate.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve editor commands over stdin/stdout.
    Serve {
        /// Workspace directory (overrides config).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Also write JSON logs to this directory.
        #[arg(long)]
        logs_dir: Option<PathBuf>,

        /// Do not write the initial app files.
        #[arg(long)]
        no_seed: bool,
    },
    /// Check whether an origin is authorized. Exits 0 if it is, 1 if not.
    CheckOrigin {
        /// Origin to check, e.g. https://editor.example.com
        origin: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let level = logging::default_level(cli.verbose);

    match cli.command {
        Commands::Serve {
            root,
            logs_dir,
            no_seed,
        } => {
            let _guard = match &logs_dir {
                Some(dir) => Some(logging::init_production(dir, level)?),
                None => {
                    logging::init_cli(level);
                    None
                }
            };
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(root) = root {
                config.kernel.root = Some(root);
            }
            serve(config, !no_seed).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckOrigin { origin } => {
            logging::init_cli(level);
            let config = Config::load(cli.config.as_deref())?;
            let validator = config.origin.validator()?;
            if validator.is_authorized(&origin) {
                println!("authorized ({})", validator.describe());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("denied ({})", validator.describe());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn serve(config: Config, seed: bool) -> Result<()> {
    let validator = config.origin.validator()?;
    let root = config.kernel_root()?;
    info!(root = %root.display(), origin_rule = %validator.describe(), "starting editor bridge");

    let kernel: Arc<dyn Kernel> = Arc::new(DirectoryKernel::new(
        root,
        config.kernel.installer.clone(),
    ));

    if seed {
        let app = config.app.clone().unwrap_or_default();
        kernel::seed(kernel.as_ref(), &app)
            .await
            .context("failed to seed workspace")?;
    }

    let transport = Transport::new(config.bridge.channel_capacity);
    let bridge = CommandBridge::new(validator, kernel);
    let binding = lifecycle::bind(&transport, bridge, config.bridge.drain_timeout())
        .context("failed to bind bridge")?;

    let frames = tokio::select! {
        result = run_frames(tokio::io::stdin(), tokio::io::stdout(), transport.sender()) => {
            Some(result.context("frame stream failed")?)
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            None
        }
    };

    let stats = binding.unbind().await;
    if let Some(frames) = frames {
        info!(
            posted = frames.posted,
            invalid = frames.invalid,
            replied = frames.replied,
            "frame stream closed"
        );
    }
    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        acked = stats.acked,
        failed = stats.failed,
        "editor bridge stopped"
    );
    Ok(())
}
