//! xfsvolctl: manage xfsvol volumes directly on the host.
//!
//! Works on the same root directory the plugin serves, without going
//! through the Docker daemon. Needs the privileges the plugin needs.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use xfsvol_core::{ManagerConfig, VolumeManager, parse_human_size};

/// Controls the xfsvol volume plugin.
#[derive(Parser, Debug)]
#[command(name = "xfsvolctl", version)]
#[command(about = "Controls the xfsvol volume plugin")]
struct Args {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List volumes and their quotas
    Ls {
        /// Root directory of the volumes (an XFS mount with pquota)
        #[arg(short, long)]
        root: PathBuf,
    },

    /// Create a volume
    Create {
        /// Root directory of the volumes (an XFS mount with pquota)
        #[arg(short, long)]
        root: PathBuf,

        /// Name of the volume
        #[arg(short, long)]
        name: String,

        /// Size limit, e.g. 512M or 2G
        #[arg(short, long, value_parser = parse_human_size)]
        size: u64,

        /// Inode limit (unlimited if omitted)
        #[arg(short, long)]
        inodes: Option<u64>,
    },

    /// Delete a volume and everything in it
    Delete {
        /// Root directory of the volumes (an XFS mount with pquota)
        #[arg(short, long)]
        root: PathBuf,

        /// Name of the volume
        #[arg(short, long)]
        name: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    match command {
        Command::Ls { root } => {
            let manager = open(root)?;
            commands::ls(&manager, &mut stdout)
        }
        Command::Create {
            root,
            name,
            size,
            inodes,
        } => {
            let mut manager = open(root)?;
            commands::create(&mut manager, &name, size, inodes, &mut stdout)
        }
        Command::Delete { root, name } => {
            let mut manager = open(root)?;
            commands::delete(&mut manager, &name)
        }
    }
}

fn open(root: PathBuf) -> Result<VolumeManager> {
    VolumeManager::new(ManagerConfig::new(&root))
        .with_context(|| format!("couldn't initialize manager at {}", root.display()))
}
