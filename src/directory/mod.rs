//! Page directory: which rendered URL belongs to which source file.
//!
//! The site exposes its page list as JSON inside a
//! `<script type="application/json">` block on the home page (emitted by the
//! live preview partial). This module fetches and parses that manifest and
//! keeps the two lookup tables the preview panel navigates with.
//!
//! # Module Structure
//!
//! - `parse` - manifest extraction from HTML
//! - `fetch` - HTTP retrieval
//! - `service` - refresh policy and URL <-> source lookups

pub mod fetch;
pub mod parse;
pub mod service;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use url::Url;

pub use fetch::{DirectoryFetcher, HttpFetcher};
pub use parse::parse_page_directory;
pub use service::PageDirectory;

/// One page of the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Canonical content URL.
    pub url: Url,
    /// Absolute path of the source file, if the page has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub lang: String,
    /// Alternative URLs serving the same page.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Url>,
}

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The site does not expose a usable manifest.
    #[error("page directory malformed or missing")]
    Malformed,

    #[error("HTTP request failed (status {0})")]
    Http(u16),

    #[error("page directory request failed: {0}")]
    Transport(String),

    #[error("unsupported protocol `{0}`")]
    UnsupportedScheme(String),
}

impl DirectoryError {
    /// Whether the failure says something about the site rather than the network.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::future::{self, BoxFuture, FutureExt};
    use parking_lot::Mutex;

    use super::fetch::FetchResult;
    use super::*;

    /// Answers every fetch with the currently scripted result.
    pub struct ScriptedFetcher {
        result: Mutex<FetchResult>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new(result: FetchResult) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(result),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn set(&self, result: FetchResult) {
            *self.result.lock() = result;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DirectoryFetcher for ScriptedFetcher {
        fn fetch(&self, _url: &Url) -> BoxFuture<'static, FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            future::ready(self.result.lock().clone()).boxed()
        }
    }

    pub fn page(url: &str, source: Option<&str>, aliases: &[&str]) -> PageInfo {
        PageInfo {
            url: Url::parse(url).unwrap(),
            source: source.map(PathBuf::from),
            lang: "en".to_string(),
            aliases: aliases.iter().map(|a| Url::parse(a).unwrap()).collect(),
        }
    }
}
