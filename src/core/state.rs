//! Shutdown state.
//!
//! Ctrl+C sets `SHUTDOWN` and wakes the coordinator, which disposes the
//! panel and kills every Hugo process before exiting. Before a coordinator
//! registered there is nothing to clean up and the process exits directly.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Wakes the coordinator on shutdown
static SHUTDOWN_TX: OnceLock<mpsc::UnboundedSender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        // A second Ctrl+C skips the cleanup
        if is_shutdown() || !request_shutdown() {
            std::process::exit(130);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Set the flag and notify the coordinator. Returns `false` if none is
/// registered.
fn request_shutdown() -> bool {
    SHUTDOWN.store(true, Ordering::SeqCst);
    match SHUTDOWN_TX.get() {
        Some(tx) => {
            crate::log!("serve"; "shutting down...");
            let _ = tx.send(());
            true
        }
        None => false,
    }
}

/// Register the coordinator for graceful shutdown
pub fn register_shutdown(tx: mpsc::UnboundedSender<()>) {
    let _ = SHUTDOWN_TX.set(tx);
}

/// Check if shutdown has been requested
fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown_notifies_coordinator() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        register_shutdown(tx);

        assert!(request_shutdown());
        assert!(is_shutdown());
        assert!(rx.try_recv().is_ok());
    }
}
