//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use url::Url;

/// Live preview orchestrator for Hugo sites
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Site root (default: nearest directory with a Hugo config file)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Config file path, relative to the site root
    #[arg(short = 'C', long, global = true, default_value = "hugo-preview.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the preview orchestrator.
    ///
    /// The host editor talks JSON lines over stdin/stdout; the preview
    /// panel's frame connects to the WebSocket bridge.
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface for the frame bridge (e.g., 127.0.0.1)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port for the frame bridge (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Milliseconds to wait for a loaded page to check in
        #[arg(long, value_name = "MS")]
        checkin_timeout: Option<u64>,

        /// Enable verbose output for debugging
        #[arg(short = 'V', long)]
        verbose: bool,
    },

    /// Print the Hugo partial that instruments the site for live preview
    #[command(visible_alias = "p")]
    Partial,

    /// Fetch and print the page directory of a running Hugo server
    #[command(visible_alias = "d")]
    Directory {
        /// Home page URL of the running server
        #[arg(value_hint = clap::ValueHint::Url)]
        url: Url,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
}

impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }

    pub const fn verbose(&self) -> bool {
        matches!(self.command, Commands::Serve { verbose: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_args() {
        let cli = Cli::parse_from(["hugo-preview", "serve", "-p", "9000", "-V"]);
        assert!(cli.is_serve());
        assert!(cli.verbose());
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000), .. }));
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from(["hugo-preview", "partial", "--root", "site"]);
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        assert_eq!(cli.config, PathBuf::from("hugo-preview.toml"));
    }
}
