use clap::{Args, Subcommand};

/// Config subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the effective configuration (API key masked)
    Show,
    /// Print the path of the loaded config file
    Path,
}

/// Per-session overrides shared by `run`, `chat` and `compare`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SessionArgs {
    /// Hard constraint for this run (repeatable; added to config constraints)
    #[arg(short = 'c', long = "constraint")]
    pub constraints: Vec<String>,

    /// Generator model id
    #[arg(long)]
    pub generator_model: Option<String>,

    /// Auditor model id
    #[arg(long)]
    pub auditor_model: Option<String>,

    /// Failures allowed at one reasoning position before escalating
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Session-wide takeover cap
    #[arg(long)]
    pub max_takeovers: Option<u32>,
}
