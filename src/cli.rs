// src/cli.rs
//! CLI definitions for mixpkg
//!
//! This module contains the command-line interface definition using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mixpkg")]
#[command(author = "mix Contributors")]
#[command(version)]
#[command(about = "Build recipes into versioned, manifested package archives", long_about = None)]
pub struct Cli {
    /// Pipeline range to run
    #[arg(value_enum, ignore_case = true)]
    pub action: Action,

    /// Recipe file (TOML or PKGBUILD)
    #[arg(short = 'p', long = "recipe", value_name = "RECIPE")]
    pub recipe: PathBuf,

    /// Source directory
    #[arg(short = 's', long = "srcdir", value_name = "DIR")]
    pub srcdir: PathBuf,

    /// Package directory; the archive is written beside it
    #[arg(short = 'd', long = "pkgdir", value_name = "DIR")]
    pub pkgdir: PathBuf,

    /// Skip detached signature verification
    #[arg(long)]
    pub nogpg: bool,

    /// Configuration file (overrides $MIXPKG_CONFIG)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Print the package manifest
    Dump,
    /// Acquire, verify and extract sources
    Download,
    /// Run the prepare, build and check stages
    Build,
    /// Run the package stage and create the archive
    Package,
    /// Download, build and package
    Compile,
}

impl Cli {
    /// Default log filter when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}
