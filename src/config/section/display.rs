//! `[display]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [display]
//! checkin_timeout_ms = 1000   # Silence after navigation before the site counts as misconfigured
//! title = "Hugo Live Preview" # Panel title when no page is previewed
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub checkin_timeout_ms: u64,
    pub title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            checkin_timeout_ms: 1000,
            title: "Hugo Live Preview".into(),
        }
    }
}

impl DisplayConfig {
    pub const CHECKIN_TIMEOUT_MS: FieldPath = FieldPath::new("display.checkin_timeout_ms");

    pub const fn checkin_timeout(&self) -> Duration {
        Duration::from_millis(self.checkin_timeout_ms)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.checkin_timeout_ms == 0 {
            diag.error(Self::CHECKIN_TIMEOUT_MS, "must be greater than 0");
        }
    }
}
