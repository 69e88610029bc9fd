use std::path::PathBuf;
use serde::Deserialize;
use thiserror::Error;

use clap::{Parser, Subcommand};

use chunkxfer::{ProtocolError, TransferError};

#[derive(Parser)]
#[command(name = "chunkxfer")]
#[command(about = "Split, join and inspect chunked transfer messages")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a file into an info message and chunk messages
    Split {
        input: PathBuf,
        outdir: PathBuf,
    },

    /// Rebuild a file from a directory made by split
    Join {
        indir: PathBuf,
        output: PathBuf,
    },

    /// Decode and print a single message
    Inspect {
        file: PathBuf,
    },
}

// Packaging options for split
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct Config {
    pub chunk_size: u32,
    pub compression: bool,
    pub checksum: bool,
    pub hash_codes: bool,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("{0}")]
    Incomplete(String),
}
