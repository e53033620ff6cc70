//! `[hugo]` section configuration.
//!
//! How the Hugo server is launched.
//!
//! # Example
//!
//! ```toml
//! [hugo]
//! command = "hugo"                        # Resolved through PATH
//! args = ["server", "--buildDrafts"]      # Arguments passed verbatim
//! script_env = "HUGO_LIVE_PREVIEW_SCRIPT" # Env var carrying the payload script
//! relay_output = true                     # Copy Hugo's output to stderr
//! ```
//!
//! The partial reads the payload script with `getenv`, so `script_env` has
//! to pass Hugo's `security.funcs.getenv` allow-list (`^HUGO_` by default).

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Hugo's default `security.funcs.getenv` allow-list prefix.
const GETENV_PREFIX: &str = "HUGO_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HugoConfig {
    /// Executable name or path.
    pub command: String,

    /// Arguments, starting with the `server` subcommand.
    pub args: Vec<String>,

    /// Environment variable the base64 payload script is exported in.
    pub script_env: String,

    /// Relay Hugo's console output to stderr.
    pub relay_output: bool,
}

impl Default for HugoConfig {
    fn default() -> Self {
        Self {
            command: "hugo".into(),
            args: vec!["server".into(), "--buildDrafts".into()],
            script_env: "HUGO_LIVE_PREVIEW_SCRIPT".into(),
            relay_output: true,
        }
    }
}

impl HugoConfig {
    pub const COMMAND: FieldPath = FieldPath::new("hugo.command");
    pub const ARGS: FieldPath = FieldPath::new("hugo.args");
    pub const SCRIPT_ENV: FieldPath = FieldPath::new("hugo.script_env");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.trim().is_empty() {
            diag.error(Self::COMMAND, "must not be empty");
        }

        if self.script_env.is_empty() {
            diag.error(Self::SCRIPT_ENV, "must not be empty");
        } else if self.script_env.contains(['=', '\0']) {
            diag.error(Self::SCRIPT_ENV, "not a valid environment variable name");
        } else if !self.script_env.starts_with(GETENV_PREFIX) {
            diag.error_with_hint(
                Self::SCRIPT_ENV,
                format!("`{}` is not readable from templates", self.script_env),
                format!(
                    "use a `{GETENV_PREFIX}` prefix or extend `security.funcs.getenv` in the Hugo config"
                ),
            );
        }

        if self.args.first().map(String::as_str) != Some("server") {
            diag.hint(Self::ARGS, "expected to start with `server`");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConfigDiagnostics, test_parse_config};

    #[test]
    fn test_hugo_config_defaults() {
        let config = test_parse_config("");

        assert_eq!(config.hugo.command, "hugo");
        assert_eq!(config.hugo.args, ["server", "--buildDrafts"]);
        assert_eq!(config.hugo.script_env, "HUGO_LIVE_PREVIEW_SCRIPT");
        assert!(config.hugo.relay_output);
    }

    #[test]
    fn test_hugo_config_override() {
        let config = test_parse_config(
            "[hugo]\ncommand = \"/opt/hugo/bin/hugo\"\nargs = [\"server\", \"-p\", \"4000\"]\nrelay_output = false",
        );

        assert_eq!(config.hugo.command, "/opt/hugo/bin/hugo");
        assert_eq!(config.hugo.args, ["server", "-p", "4000"]);
        assert!(!config.hugo.relay_output);
        // Untouched field keeps its default
        assert_eq!(config.hugo.script_env, "HUGO_LIVE_PREVIEW_SCRIPT");
    }

    #[test]
    fn test_hugo_config_validation() {
        let config = test_parse_config("[hugo]\ncommand = \" \"\nscript_env = \"PREVIEW\"");
        let mut diag = ConfigDiagnostics::new();
        config.hugo.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["hugo.command", "hugo.script_env"]);
        assert!(diag.errors()[1].hint.as_deref().unwrap().contains("HUGO_"));
    }

    #[test]
    fn test_hugo_config_valid() {
        let config = test_parse_config("");
        let mut diag = ConfigDiagnostics::new();
        config.hugo.validate(&mut diag);
        assert!(diag.is_empty());
    }
}
