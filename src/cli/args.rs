use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Route chat requests across codex, augment and cursor backends", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single prompt through the dispatcher
    Ask {
        /// Prompt text
        prompt: String,

        /// Model name, also used to pick a backend
        #[arg(short, long, default_value = "")]
        model: String,

        /// Force a backend id instead of selecting one
        #[arg(short, long)]
        backend: Option<String>,

        /// Reasoning effort (minimal, low, medium, high)
        #[arg(long)]
        effort: Option<String>,

        /// Reasoning summary (auto, concise, detailed)
        #[arg(long)]
        summary: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a raw JSON request body the way an HTTP handler would
    Request {
        /// File holding the body, `-` or nothing for stdin
        file: Option<PathBuf>,

        /// Force a backend id instead of selecting one
        #[arg(short, long)]
        backend: Option<String>,
    },
    /// List registered backends
    List,
    /// Show backend availability and cache state
    Status,
    /// Initialize configuration
    Init,
}
