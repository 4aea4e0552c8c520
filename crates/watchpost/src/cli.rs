use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "watchpost")]
#[command(version)]
#[command(about = "Site security monitoring: vision, retrieval-augmented reasoning and alarms")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a spool directory for frames and run the pipeline until Ctrl-C
    Run {
        /// Directory frames are dropped into (defaults to <home>/spool)
        #[arg(short, long)]
        spool: Option<PathBuf>,
    },

    /// Run one inference cycle on an image and print the report
    Analyze {
        /// JPEG or PNG file
        image: PathBuf,
    },

    /// Rebuild the knowledge index from the corpus
    RebuildIndex,

    /// Query the knowledge index
    Search {
        query: String,

        /// Number of hits (defaults to the configured top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Show knowledge base and case statistics
    Stats,

    /// List stored cases, newest first
    Cases {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print one stored case
    Case { case_id: String },

    /// Record the review outcome of a case
    Review { case_id: String, result: String },

    /// Recover JSON from model output (stdin when no file is given)
    Repair {
        file: Option<PathBuf>,

        /// Model named in synthesized metadata
        #[arg(short, long, default_value = "unknown")]
        model: String,
    },

    /// Print version information
    Version,
}
