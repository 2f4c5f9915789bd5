use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tokenguard_types::models::config::StorageBackend;

#[derive(Parser, Debug)]
#[command(
    name = "tokenguard-server",
    about = "TokenGuard - token-aware admission gateway for LLM backends",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "TOKENGUARD_CONFIG", help = "Path to the JSON config file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, env = "TOKENGUARD_PORT")]
    pub port: Option<u16>,

    #[arg(short, long, env = "TOKENGUARD_UPSTREAM_URL", help = "Backend base URL")]
    pub upstream: Option<String>,

    #[arg(short, long, env = "TOKENGUARD_STORAGE", help = "Usage store: memory | sqlite")]
    pub storage: Option<StorageBackend>,

    #[arg(short, long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    #[arg(long, env = "TOKENGUARD_LOG_FILE", help = "Also write logs to a daily-rolling file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Start the gateway (default if no command specified)")]
    Serve,

    #[command(about = "Print the admission estimate for a text")]
    Estimate {
        #[arg(help = "Text to estimate")]
        text: String,

        #[arg(long, help = "Declared output budget (defaults to estimator.default_max_tokens)")]
        max_tokens: Option<u64>,
    },

    #[command(about = "Load and validate the configuration, then print it")]
    CheckConfig,
}
