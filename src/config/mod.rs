//! Preview configuration from `hugo-preview.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── bridge     # [bridge]
//! │   ├── display    # [display]
//! │   └── hugo       # [hugo]
//! ├── types/         # ConfigError, diagnostics, FieldPath
//! ├── util           # Site root discovery
//! └── mod.rs         # PreviewConfig (this file)
//! ```
//!
//! The file is optional and lives in the site root. Every section has
//! defaults; CLI options override file values.

pub mod section;
pub mod types;
mod util;

pub use section::{BridgeConfig, DisplayConfig, HugoConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};
pub use util::{find_site_root, is_site_root};

use crate::cli::{Cli, Commands};
use crate::log;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Absolute path of the config file, which need not exist
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Hugo site root
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub hugo: HugoConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl PreviewConfig {
    /// Load configuration for `cli`.
    ///
    /// The site root is `--root`, else the nearest ancestor of the working
    /// directory with a Hugo config, else the working directory itself.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let root = Self::resolve_root(cli, &cwd)?;
        let config_path = if cli.config.is_absolute() {
            cli.config.clone()
        } else {
            root.join(&cli.config)
        };

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            crate::debug!("config"; "{} not found, using defaults", config_path.display());
            Self::default()
        };
        config.config_path = config_path;
        config.root = root;
        config.apply_command_options(&cli.command);
        config.validate()?;

        if !is_site_root(&config.root) && cli.is_serve() {
            log!("warning"; "no Hugo config found in {}", config.root.display());
        }
        Ok(config)
    }

    fn resolve_root(cli: &Cli, cwd: &Path) -> Result<PathBuf> {
        let root = match &cli.root {
            Some(root) => cwd.join(root),
            None => find_site_root(cwd).unwrap_or_else(|| cwd.to_path_buf()),
        };
        root.canonicalize()
            .with_context(|| format!("site root `{}` is not accessible", root.display()))
    }

    /// Load configuration from a file, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .map_err(|err| ConfigError::Toml(path.to_path_buf(), err))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), toml::de::Error> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    fn apply_command_options(&mut self, command: &Commands) {
        if let Commands::Serve {
            interface,
            port,
            checkin_timeout,
            ..
        } = command
        {
            Self::update_option(&mut self.bridge.interface, interface.as_ref());
            Self::update_option(&mut self.bridge.port, port.as_ref());
            Self::update_option(&mut self.display.checkin_timeout_ms, checkin_timeout.as_ref());
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();
        self.hugo.validate(&mut diag);
        self.display.validate(&mut diag);
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields to catch typos in tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> PreviewConfig {
    let (parsed, ignored) = PreviewConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("hugo-preview").chain(args.iter().copied()))
    }

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hugo.toml"), "title = 'Test'").unwrap();
        dir
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(PreviewConfig::parse_with_ignored("[hugo\ncommand = \"hugo\"").is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[hugo]\ncommand = \"hugo\"\nflavour = \"extended\"\n[unknown_section]\nfield = 1";
        let (config, ignored) = PreviewConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.hugo.command, "hugo");
        assert!(ignored.iter().any(|f| f == "hugo.flavour"));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = site();
        let root = dir.path().to_str().unwrap();
        let config = PreviewConfig::load(&cli(&["--root", root, "partial"])).unwrap();

        assert_eq!(config.root, dir.path().canonicalize().unwrap());
        assert_eq!(config.config_path, config.root.join("hugo-preview.toml"));
        assert_eq!(config.hugo, HugoConfig::default());
    }

    #[test]
    fn test_load_applies_cli_overrides() {
        let dir = site();
        fs::write(
            dir.path().join("hugo-preview.toml"),
            "[bridge]\nport = 9000\n[display]\ncheckin_timeout_ms = 3000\ntitle = \"Site\"",
        )
        .unwrap();
        let root = dir.path().to_str().unwrap();

        let config = PreviewConfig::load(&cli(&["--root", root, "serve"])).unwrap();
        assert_eq!(config.bridge.port, 9000);
        assert_eq!(config.display.checkin_timeout_ms, 3000);

        let config = PreviewConfig::load(&cli(&[
            "--root",
            root,
            "serve",
            "--port",
            "9100",
            "--checkin-timeout",
            "500",
        ]))
        .unwrap();
        assert_eq!(config.bridge.port, 9100);
        assert_eq!(config.display.checkin_timeout_ms, 500);
        // File values without a CLI counterpart survive
        assert_eq!(config.display.title, "Site");
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = site();
        fs::write(dir.path().join("hugo-preview.toml"), "[hugo]\ncommand = \"\"").unwrap();
        let root = dir.path().to_str().unwrap();

        let err = PreviewConfig::load(&cli(&["--root", root, "partial"])).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
