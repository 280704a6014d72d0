use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(version, about = "Launch debug adapters from launch.json configurations")]
pub(crate) struct Args {
    /// Path to the settings file
    #[clap(short, long, global = true)]
    pub(crate) settings: Option<PathBuf>,

    #[clap(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// List the launch configurations that apply to a file
    List {
        /// File being debugged
        file: PathBuf,
    },
    /// Launch a configuration and relay the target's output until it exits
    Launch {
        /// File being debugged
        file: PathBuf,

        /// Name of the launch configuration to choose
        #[clap(short, long)]
        name: Option<String>,

        /// Workspace folder for `${workspaceFolder}`
        #[clap(short, long)]
        workspace: Option<PathBuf>,
    },
}
