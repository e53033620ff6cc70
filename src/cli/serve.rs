//! `serve` command: the live preview session.
//!
//! ```text
//! stdin  --[HostCommand]--> App --[HostEvent]--> stdout
//!                            ^ |
//!       frame bridge --------+ +--> PreviewPanel --> Hugo servers
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::app::{App, AppChannels, AppSettings};
use crate::bridge::{self, FrameBridge};
use crate::config::PreviewConfig;
use crate::directory::HttpFetcher;
use crate::hugo::{ConsoleSink, HugoLauncher, NullSink, OutputSink, ServerRegistry};
use crate::log;
use crate::protocol::HostSender;

/// How long blocked stdin reads may hold up exit.
const EXIT_GRACE: Duration = Duration::from_millis(500);

pub fn serve(config: &PreviewConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hugo-preview")
        .build()?;
    let result = runtime.block_on(run(config));
    // The stdin reader sits in a blocking read that never returns on its own
    runtime.shutdown_timeout(EXIT_GRACE);
    result
}

async fn run(config: &PreviewConfig) -> Result<()> {
    let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
    let frame_bridge = FrameBridge::start(config.bridge.addr(), bridge_tx)?;
    log!("serve"; "frame bridge at {}", frame_bridge.url());

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    crate::core::register_shutdown(shutdown_tx);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(bridge::read_commands(
        BufReader::new(tokio::io::stdin()),
        command_tx,
    ));
    let (host, host_rx) = HostSender::channel();
    let writer = tokio::spawn(bridge::write_events(tokio::io::stdout(), host_rx));

    let sink: Arc<dyn OutputSink> = if config.hugo.relay_output {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(NullSink)
    };
    let launcher = HugoLauncher::new(config.root.clone(), config.hugo.clone(), sink);
    let registry = Arc::new(ServerRegistry::new(Arc::new(launcher)));
    let fetcher = Arc::new(HttpFetcher::new()?);

    let settings = AppSettings {
        bridge_url: frame_bridge.url(),
        root: config.root.clone(),
        checkin_timeout: config.display.checkin_timeout(),
        title: config.display.title.clone(),
        script_env: config.hugo.script_env.clone(),
    };
    log!("serve"; "previewing {}", config.root.display());
    App::new(registry, fetcher, host, settings)
        .run(AppChannels {
            host: command_rx,
            bridge: bridge_rx,
            shutdown: shutdown_rx,
        })
        .await;

    // Flush what the host has not seen yet
    let _ = writer.await;
    Ok(())
}
