use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlsink::{LevelFilter, YAML_CONFIG_NAME};

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "sqlsink", about = "Batched SQLite upserts from streams of JSON records", version)]
pub struct CLI {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Writes newline delimited JSON items into SQLite using the writer set up in the manifest.
    ///
    /// Each line is a JSON object, an array of objects, or a routed envelope
    /// `{"table": "<name>", "payload": ...}`.
    ///
    /// Example:
    /// `sqlsink write --manifest sqlsink.yaml --input users.ndjson`
    #[clap(name = "write")]
    Write {
        /// The manifest to run, default is sqlsink.yaml in the current directory.
        #[clap(long, short, default_value = YAML_CONFIG_NAME)]
        manifest: PathBuf,

        /// optional - File of newline delimited JSON items, default reads stdin.
        #[clap(long, short)]
        input: Option<PathBuf>,

        /// Log level: off, error, warn, info, debug or trace.
        #[clap(long, default_value = "info")]
        log_level: LevelFilter,
    },

    /// Prints the statements the manifest's writer would run for each item, without touching the
    /// database.
    ///
    /// Example:
    /// `sqlsink compile --manifest sqlsink.yaml --input users.ndjson`
    #[clap(name = "compile")]
    Compile {
        /// The manifest to use, default is sqlsink.yaml in the current directory.
        #[clap(long, short, default_value = YAML_CONFIG_NAME)]
        manifest: PathBuf,

        /// optional - File of newline delimited JSON items, default reads stdin.
        #[clap(long, short)]
        input: Option<PathBuf>,
    },
}
