//! CLI module for PosterBot.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::{ImageStrategy, Platform};
use clap::{Parser, Subcommand};

/// PosterBot - Topic-driven short video generator
///
/// Turns a topic configuration into narrated slideshow videos and sends them
/// to a distribution channel.
#[derive(Parser, Debug)]
#[command(name = "posterbot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate videos for a topic
    Run {
        /// Topic name or path to a topic file
        #[arg(short, long)]
        topic: String,

        /// Number of videos to generate
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Distribution channel (none, email, tiktok); defaults to the topic's choice
        #[arg(short, long)]
        distribute_to: Option<Platform>,

        /// Skip distribution entirely
        #[arg(long, conflicts_with = "distribute_to")]
        no_distribute: bool,

        /// Override the image strategy (flux-schnell, flux-dev, pexels, duckduckgo)
        #[arg(short, long)]
        strategy: Option<ImageStrategy>,
    },

    /// List available topic configurations
    Topics,

    /// Validate a topic configuration and print its summary
    Validate {
        /// Topic name or path to a topic file
        topic: String,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Write default settings and the bundled topics to disk
    Init,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Authorize PosterBot to post to a TikTok account
    #[command(name = "tiktok-auth")]
    TikTokAuth,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
