use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::backend::WslVersion;

#[derive(Parser, Debug)]
#[command(
    name = "wsldev",
    version,
    about = "Provision disposable Ubuntu instances on WSL"
)]
pub struct Cli {
    /// Path to config file (default: <config dir>/wsldev/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download, import and set up a new instance, then open a shell in it
    Create {
        /// Ubuntu release codename (default from config, else focal)
        #[arg(long)]
        release: Option<String>,

        /// WSL version to import with
        #[arg(long, value_enum)]
        version: Option<WslVersion>,

        /// Re-download the image even if it is cached
        #[arg(long)]
        force: bool,

        /// Skip the package update
        #[arg(long)]
        no_update: bool,

        /// Don't create a user; log in as root
        #[arg(long)]
        root_only: bool,

        /// Extra package repositories, comma-separated (e.g. ppa:git-core/ppa)
        #[arg(long, value_name = "LIST", default_value = "")]
        ppa: String,

        /// Print how to enter the instance instead of opening a shell
        #[arg(long)]
        no_shell: bool,
    },

    /// Terminate, unregister and delete one instance
    Remove {
        /// Instance id (with or without the wsldev- prefix)
        id: String,
    },

    /// Remove every instance
    RemoveAll {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List instances
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage cached root filesystem images
    Image {
        #[command(subcommand)]
        action: ImageCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// List cached images
    List,
    /// Delete a cached image
    Delete {
        /// Release codename
        release: String,

        /// Architecture (default: host architecture)
        #[arg(long)]
        arch: Option<String>,
    },
    /// Delete all cached images
    Clear,
}
