//! hugo-preview - Live preview orchestrator for Hugo sites.

mod app;
mod bridge;
mod cli;
mod config;
mod core;
mod directory;
mod display;
mod embed;
mod hugo;
mod logger;
mod panel;
mod protocol;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::PreviewConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose());

    let config = PreviewConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::serve(&config),
        Commands::Partial => cli::partial::print_partial(&config),
        Commands::Directory { url, pretty } => cli::directory::print_directory(url, *pretty),
    }
}
