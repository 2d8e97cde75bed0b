#[cfg(feature = "jemalloc")]
use jemallocator::Jemalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::Parser;

use crate::{
    cli_interface::{Commands, CLI},
    commands::{compile::handle_compile_command, write::handle_write_command},
};

mod cli_interface;
mod commands;
mod console;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();

    match &cli.command {
        Commands::Write { manifest, input, log_level } => {
            handle_write_command(manifest, input, *log_level).await
        }
        Commands::Compile { manifest, input } => handle_compile_command(manifest, input),
    }
}
