use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_DATASET_PATH;
use crate::rag::{DEFAULT_FINETUNE_PATH, DEFAULT_TOP_K};
use crate::search::{DistanceMetric, DEFAULT_EMBEDDING_MODEL_ID};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Ask questions about logistics delivery costs",
    long_about = None
)]
pub struct Cli {
    /// Path to the delivery cost CSV dataset
    #[arg(short, long, global = true, default_value = DEFAULT_DATASET_PATH)]
    pub data: PathBuf,

    /// Distance used to rank retrieved records
    #[arg(long, global = true, value_enum, default_value_t = DistanceMetric::Euclidean)]
    pub metric: DistanceMetric,

    /// Static embedding model to load
    #[arg(long, global = true, default_value = DEFAULT_EMBEDDING_MODEL_ID)]
    pub embedding_model: String,

    /// Reuse (or write) the embedded index at this path
    #[arg(long, global = true)]
    pub index_cache: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a question using retrieved records as context
    Ask {
        query: String,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Give up on the language model after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the prompt that would be sent, without calling the model
    Prompt {
        query: String,
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Write the prompt/completion JSONL used for fine-tuning
    ExportFinetune {
        #[arg(short, long, default_value = DEFAULT_FINETUNE_PATH)]
        output: PathBuf,
    },
    /// Print monthly trends, group averages and significance tests
    Analyze {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
