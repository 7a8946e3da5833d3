use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod subcommands;

pub use subcommands::{ConfigCommands, SessionArgs};

/// `ThinkTwice` - audit a model's reasoning step by step before it answers.
#[derive(Parser, Debug)]
#[command(name = "thinktwice")]
#[command(version = "0.1.0")]
#[command(about = "Speculative auditing loop for LLM reasoning.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.thinktwice/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one audited request and print the verified answer
    Run {
        /// The request to answer
        #[arg(short, long)]
        message: String,

        /// Print the result and transcript as JSON instead of streaming
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Interactive chat; every message runs in a fresh audited session
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Run prompts raw and audited side by side; prints a JSON report
    Compare {
        /// Prompt to compare (repeatable)
        #[arg(short, long = "prompt", required = true)]
        prompts: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}
