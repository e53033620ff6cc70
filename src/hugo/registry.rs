//! Server registry - at most one live Hugo process per embedding origin.
//!
//! Concurrent requests for the same origin share one start attempt. Failed
//! attempts and terminated servers unregister themselves, so the next
//! request spawns a fresh process. Every entry carries an attempt number
//! and bookkeeping only removes the entry it created.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::process::Launcher;
use super::{HugoServer, ServerError};

pub type ServerResult = Result<Arc<HugoServer>, Arc<ServerError>>;

/// A start attempt that any number of callers can await.
pub type PendingServer = Shared<BoxFuture<'static, ServerResult>>;

/// How long `shutdown_all` waits for processes to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Entry {
    attempt: u64,
    start: PendingServer,
}

type Entries = Arc<Mutex<FxHashMap<String, Entry>>>;

pub struct ServerRegistry {
    launcher: Arc<dyn Launcher>,
    entries: Entries,
    next_attempt: AtomicU64,
}

impl ServerRegistry {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            entries: Arc::default(),
            next_attempt: AtomicU64::new(0),
        }
    }

    /// Start a server for `origin` unless one is starting or running already.
    ///
    /// Must be called within a tokio runtime: the start runs in its own task
    /// whether or not the returned future is polled.
    pub fn request_server(&self, origin: &str) -> PendingServer {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(origin) {
            // Termination bookkeeping runs in its own task and may lag behind
            let dead = matches!(entry.start.peek(), Some(Ok(server)) if server.is_terminated());
            if !dead {
                crate::debug!("hugo"; "reusing server for {}", origin);
                return entry.start.clone();
            }
        }

        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let launch = self.launcher.launch(origin);
        let task = tokio::spawn(track(
            launch,
            Arc::clone(&self.entries),
            origin.to_string(),
            attempt,
        ));
        let start = async move {
            task.await.unwrap_or_else(|e| {
                Err(Arc::new(ServerError::Exited(format!("Hugo start aborted: {e}"))))
            })
        }
        .boxed()
        .shared();

        entries.insert(
            origin.to_string(),
            Entry {
                attempt,
                start: start.clone(),
            },
        );
        start
    }

    pub fn is_registered(&self, origin: &str) -> bool {
        self.entries.lock().contains_key(origin)
    }

    /// Ask every running server to stop and wait (briefly) until they did.
    pub async fn shutdown_all(&self) {
        let servers: Vec<Arc<HugoServer>> = self
            .entries
            .lock()
            .values()
            .filter_map(|entry| entry.start.peek().cloned())
            .filter_map(Result::ok)
            .collect();

        if servers.is_empty() {
            return;
        }
        crate::debug!("hugo"; "stopping {} server(s)", servers.len());
        for server in &servers {
            server.shutdown();
        }
        let exits = join_all(servers.iter().map(|s| s.wait_terminated()));
        if tokio::time::timeout(SHUTDOWN_GRACE, exits).await.is_err() {
            crate::log!("hugo"; "servers did not stop in time");
        }
    }
}

/// Run one start attempt and keep the registry in sync with its outcome.
async fn track(
    launch: BoxFuture<'static, Result<Arc<HugoServer>, ServerError>>,
    entries: Entries,
    origin: String,
    attempt: u64,
) -> ServerResult {
    match launch.await {
        Ok(server) => {
            let watched = Arc::clone(&server);
            tokio::spawn(async move {
                let err = watched.wait_terminated().await;
                crate::debug!("hugo"; "server for {} terminated: {}", origin, err);
                unregister(&entries, &origin, attempt);
            });
            Ok(server)
        }
        Err(err) => {
            crate::debug!("hugo"; "server for {} failed to start: {}", origin, err);
            unregister(&entries, &origin, attempt);
            Err(Arc::new(err))
        }
    }
}

fn unregister(entries: &Mutex<FxHashMap<String, Entry>>, origin: &str, attempt: u64) {
    let mut entries = entries.lock();
    if entries.get(origin).is_some_and(|e| e.attempt == attempt) {
        entries.remove(origin);
    }
}

// ============================================================================
// Tests
// ============================================================================
