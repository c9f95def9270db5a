use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cellar",
    about = "Cellar: inspect canonical cell encodings and cell stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (defaults to ./cellar.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode a hex encoding and describe the cell
    Decode(DecodeArgs),
    /// Print the hash of a canonical encoding
    Hash(HashArgs),
    /// Decode a hex encoding and persist it into a store
    Import(ImportArgs),
    /// Fetch a cell from a store and print it
    Show(ShowArgs),
    /// Reference statistics for a stored cell graph
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Encoding as hex, optionally prefixed with 0x
    pub encoding: String,
    /// Also run structural validation
    #[arg(long)]
    pub validate: bool,
}

#[derive(Args)]
pub struct HashArgs {
    pub encoding: String,
}

#[derive(Args)]
pub struct StoreArgs {
    /// Store directory (overrides the configured root)
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub encoding: String,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Mark the imported graph announced rather than persisted
    #[arg(long)]
    pub announce: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub hash: String,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Print budget in bytes (overrides the configured limit)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct StatsArgs {
    pub hash: String,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Maximum number of missing hashes to report
    #[arg(long, default_value = "20")]
    pub missing_limit: usize,
}
