//! Cached page directory of one Hugo server.
//!
//! # Refresh policy
//!
//! A refresh is issued on attach and after every rebuild, unless the server
//! is gone or the last build failed (the previous tables are kept). Fetches
//! run in their own task and report back through a callback; only the result
//! of the most recently issued fetch is applied.
//!
//! # Staleness
//!
//! The source table is rebuilt from scratch on every successful refresh. The
//! URL table is only ever added to: after a slug edit the old URL still maps
//! to the old entry, whose source file leads to the new URL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use url::Url;

use super::PageInfo;
use super::fetch::{DirectoryFetcher, FetchResult};
use crate::hugo::HugoServer;

pub struct PageDirectory {
    server: Arc<HugoServer>,
    fetcher: Arc<dyn DirectoryFetcher>,
    by_url: FxHashMap<Url, Arc<PageInfo>>,
    by_source: FxHashMap<PathBuf, Arc<PageInfo>>,
    /// Token of the most recently issued fetch.
    latest: u64,
    unavailable: bool,
}

impl PageDirectory {
    pub fn new(server: Arc<HugoServer>, fetcher: Arc<dyn DirectoryFetcher>) -> Self {
        Self {
            server,
            fetcher,
            by_url: FxHashMap::default(),
            by_source: FxHashMap::default(),
            latest: 0,
            unavailable: false,
        }
    }

    /// Start fetching the directory; `notify` receives the token and result.
    ///
    /// Returns the token, or `None` when the refresh was skipped.
    pub fn refresh<F>(&mut self, notify: F) -> Option<u64>
    where
        F: FnOnce(u64, FetchResult) + Send + 'static,
    {
        if self.server.is_terminated() || self.server.has_build_errors() {
            crate::debug!("directory"; "refresh skipped");
            return None;
        }
        let url = self.server.primary_url()?.clone();

        self.latest += 1;
        let token = self.latest;
        let fetch = self.fetcher.fetch(&url);
        tokio::spawn(async move { notify(token, fetch.await) });
        Some(token)
    }

    /// Apply a fetch result. Returns `false` when it was superseded.
    pub fn apply(&mut self, token: u64, result: FetchResult) -> bool {
        if token != self.latest {
            crate::debug!("directory"; "discarding superseded fetch #{}", token);
            return false;
        }
        match result {
            Ok(pages) => {
                self.by_source.clear();
                for page in pages {
                    let page = Arc::new(page);
                    if let Some(source) = &page.source {
                        self.by_source.insert(source.clone(), Arc::clone(&page));
                    }
                    self.link(page.url.clone(), &page);
                    for alias in &page.aliases {
                        self.link(alias.clone(), &page);
                    }
                }
                self.unavailable = false;
            }
            Err(err) if err.is_malformed() => {
                crate::debug!("directory"; "{}", err);
                self.unavailable = true;
            }
            Err(err) => {
                crate::log!("directory"; "{}", err);
            }
        }
        true
    }

    fn link(&mut self, url: Url, page: &Arc<PageInfo>) {
        if self.server.can_serve_url(&url) {
            self.by_url.insert(url, Arc::clone(page));
        }
    }

    /// Source file of the page at `url`.
    ///
    /// Stale URLs keep resolving, but only to sources that still exist in the
    /// current directory.
    pub fn source_file_by_url(&self, url: &Url) -> Option<&Path> {
        let source = self.by_url.get(url)?.source.as_deref()?;
        self.by_source.contains_key(source).then_some(source)
    }

    /// Content URL of `source`. `preferred` is returned as is when it is one
    /// of the page's aliases, otherwise the canonical URL.
    pub fn url_by_source_file(&self, source: &Path, preferred: Option<&Url>) -> Option<Url> {
        let page = self.by_source.get(source)?;
        match preferred {
            Some(alias) if page.aliases.contains(alias) => Some(alias.clone()),
            _ => Some(page.url.clone()),
        }
    }

    /// Set when the site does not expose a usable page directory.
    pub const fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    pub fn server(&self) -> &Arc<HugoServer> {
        &self.server
    }
}
