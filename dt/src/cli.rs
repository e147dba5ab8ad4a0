//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Daytrip - one-day walking route planner
#[derive(Parser)]
#[command(
    name = "daytrip",
    about = "Plan a one-day walking route and export it to your calendar",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Do not contact the planning service or directions provider
    #[arg(long, global = true)]
    pub offline: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build an itinerary from flags
    Plan {
        /// Trip date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Interest tags, comma separated or repeated
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Budget (low, medium, high)
        #[arg(short, long)]
        budget: Option<String>,

        /// Walking pace (relaxed, normal, fast)
        #[arg(short, long)]
        pace: Option<String>,

        /// City name sent to the planner (defaults to config)
        #[arg(long)]
        city: Option<String>,

        #[command(flatten)]
        start: StartArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Answer the assistant's questions, then build an itinerary
    Chat {
        /// Trip date (YYYY-MM-DD); the assistant will not ask for it
        #[arg(short, long)]
        date: Option<String>,

        /// City name (defaults to config)
        #[arg(long)]
        city: Option<String>,

        #[command(flatten)]
        start: StartArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the interest tags the planner understands
    Tags {
        /// Normalize these tags instead of listing the vocabulary
        #[arg(value_name = "TAG")]
        normalize: Vec<String>,
    },
}

/// Where the walk starts
#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    /// Start latitude (with --lon; otherwise the city center)
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Start longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Reported accuracy of --lat/--lon in meters
    #[arg(long)]
    pub accuracy: Option<f64>,

    /// Search radius in meters (100-2000)
    #[arg(long)]
    pub radius: Option<u32>,
}

/// What to print or write after a build
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Write the calendar (.ics) to this path
    #[arg(long, value_name = "PATH")]
    pub ics: Option<PathBuf>,

    /// Print a short explanation of the route
    #[arg(long)]
    pub explain: bool,

    /// Print the itinerary as JSON instead of text
    #[arg(long)]
    pub json: bool,
}
