//! Hugo server processes.
//!
//! # Module Structure
//!
//! - `output` - line buffering and lifecycle parsing of Hugo's console output
//! - `process` - spawning and supervising `hugo server`
//! - `registry` - one live server per embedding origin
//!
//! A [`HugoServer`] only exists once Hugo announced at least one URL. It is
//! shared (`Arc`) between the registry and the preview panel and never comes
//! back to life after termination; a new process gets a new handle.

pub mod output;
pub mod process;
pub mod registry;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Notify, broadcast, watch};
use url::Url;

pub use process::{ConsoleSink, HugoLauncher, Launcher, NullSink, OutputSink, Stream};
pub use registry::{PendingServer, ServerRegistry};

/// Event channel capacity; subscribers only ever lag on a stuck coordinator.
const EVENT_CAPACITY: usize = 16;

/// Process-level failures. Build errors are reported separately on the handle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("`{0}` not found, is Hugo installed and on PATH?")]
    NotFound(String),

    #[error("failed to launch `{program}`: {err}")]
    Spawn {
        program: String,
        err: std::io::Error,
    },

    #[error("didn't find webserver URL in Hugo output")]
    MissingUrl,

    /// Exit description, e.g. `Hugo process terminated with exit code: 1`.
    #[error("{0}")]
    Exited(String),
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A rebuild finished; `build_errors` has been replaced.
    Rebuilt,
    /// The process is gone for good.
    Terminated(Arc<ServerError>),
}

/// A running `hugo server` instance.
#[derive(Debug)]
pub struct HugoServer {
    urls: Vec<Url>,
    build_errors: Mutex<Vec<String>>,
    termination: watch::Sender<Option<Arc<ServerError>>>,
    events: broadcast::Sender<ServerEvent>,
    kill: Arc<Notify>,
}

impl HugoServer {
    /// `urls` must be non-empty. `kill` is the supervisor's kill switch.
    pub(crate) fn new(urls: Vec<Url>, build_errors: Vec<String>, kill: Arc<Notify>) -> Self {
        debug_assert!(!urls.is_empty());
        let (termination, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            urls,
            build_errors: Mutex::new(build_errors),
            termination,
            events,
            kill,
        }
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// URL the page directory is fetched from.
    pub fn primary_url(&self) -> Option<&Url> {
        self.urls.first()
    }

    /// Whether `url` shares scheme, host and port with one of the server URLs.
    pub fn can_serve_url(&self, url: &Url) -> bool {
        let origin = url.origin();
        origin.is_tuple() && self.urls.iter().any(|u| u.origin() == origin)
    }

    /// `scheme://authority` of every server URL, in order.
    pub fn origins(&self) -> Vec<String> {
        self.urls
            .iter()
            .map(|u| u.origin().ascii_serialization())
            .collect()
    }

    pub fn build_errors(&self) -> Vec<String> {
        self.build_errors.lock().clone()
    }

    pub fn has_build_errors(&self) -> bool {
        !self.build_errors.lock().is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.borrow().is_some()
    }

    pub fn termination_error(&self) -> Option<Arc<ServerError>> {
        self.termination.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Resolves once the process is gone, immediately if it already is.
    pub async fn wait_terminated(&self) -> Arc<ServerError> {
        let mut rx = self.termination.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(err) => err.clone().unwrap_or_else(|| Arc::new(ServerError::MissingUrl)),
            // Sender lives in `self`, unreachable while we hold `&self`
            Err(_) => Arc::new(ServerError::Exited("Hugo server dropped".to_string())),
        }
    }

    /// Ask the supervisor to kill the process. Termination is reported
    /// through the normal exit path.
    pub fn shutdown(&self) {
        self.kill.notify_one();
    }

    pub(crate) fn notify_rebuilt(&self, errors: Vec<String>) {
        *self.build_errors.lock() = errors;
        let _ = self.events.send(ServerEvent::Rebuilt);
    }

    pub(crate) fn terminate(&self, err: Arc<ServerError>) {
        let first = self.termination.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::clone(&err));
            true
        });
        if first {
            let _ = self.events.send(ServerEvent::Terminated(err));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) fn test_server(urls: &[&str]) -> Arc<HugoServer> {
    let urls = urls.iter().map(|u| Url::parse(u).unwrap()).collect();
    Arc::new(HugoServer::new(urls, Vec::new(), Arc::default()))
}
