//! Command-line interface

pub mod logging;
pub mod menu;
pub mod output;

use crate::core::config::ConfigOverrides;
use clap::{ArgGroup, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Build, sign and package a secure-boot image for i.MX 93 boards
#[derive(Debug, Parser, Clone)]
#[command(name = "secboot")]
#[command(version)]
#[command(about = "Secure-boot image pipeline for i.MX 93 boards", long_about = None)]
#[command(group(
    ArgGroup::new("mode").args(["all", "all_no_keys", "steps", "menu", "list"])
))]
pub struct Cli {
    /// Run every step
    #[arg(long)]
    pub all: bool,

    /// Run every step except key generation
    #[arg(long)]
    pub all_no_keys: bool,

    /// Run only these steps (number or key; repeatable or comma-separated)
    #[arg(short = 's', long = "step", value_name = "STEP", value_delimiter = ',')]
    pub steps: Vec<String>,

    /// Show the interactive menu (default when no mode is given)
    #[arg(long)]
    pub menu: bool,

    /// List the pipeline steps and exit
    #[arg(long)]
    pub list: bool,

    /// Print the step list as JSON
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Target board (frdm, evk)
    #[arg(short, long)]
    pub board: Option<String>,

    /// Boot media (emmc, sd)
    #[arg(short = 'm', long)]
    pub boot_media: Option<String>,

    /// Skip SRK key generation
    #[arg(long)]
    pub skip_keys: bool,

    /// Wait for Enter between steps
    #[arg(short, long)]
    pub pause: bool,

    /// Workspace directory
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Also write console output to this file
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// How this invocation selects steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    All,
    Steps(Vec<String>),
    Menu,
    List { json: bool },
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    pub fn mode(&self) -> RunMode {
        if self.list {
            RunMode::List { json: self.json }
        } else if self.all || self.all_no_keys {
            RunMode::All
        } else if !self.steps.is_empty() {
            RunMode::Steps(self.steps.clone())
        } else {
            RunMode::Menu
        }
    }

    /// Settings given on the command line; the highest configuration layer
    pub fn explicit_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workspace: self.workspace.clone(),
            board: self.board.clone(),
            boot_media: self.boot_media.clone(),
            skip_key_generation: (self.skip_keys || self.all_no_keys).then_some(true),
            pause_between_steps: self.pause.then_some(true),
            log_file: self.log_file.clone(),
            color: self.no_color.then_some(false),
        }
    }
}
