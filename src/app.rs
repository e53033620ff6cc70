//! The coordinator: owns the preview panel and routes between the host
//! editor, the embedding frame and the panel.
//!
//! Everything runs on one task. Background work started by the panel reports
//! back through the panel's own channel, so the panel is only ever touched
//! from [`App::run`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::bridge::BridgeEvent;
use crate::directory::DirectoryFetcher;
use crate::embed::{LIVE_PREVIEW_PARTIAL, PartialVars};
use crate::hugo::ServerRegistry;
use crate::log;
use crate::panel::{PanelEvent, PanelOptions, PanelOutput, PreviewPanel};
use crate::protocol::{HostCommand, HostEvent, HostSender};

/// Fixed parameters of a session.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Where the embedding frame connects.
    pub bridge_url: String,
    pub root: PathBuf,
    pub checkin_timeout: Duration,
    pub title: String,
    /// Environment variable the partial reads the payload from.
    pub script_env: String,
}

/// Inputs of [`App::run`].
pub struct AppChannels {
    pub host: mpsc::UnboundedReceiver<HostCommand>,
    pub bridge: mpsc::UnboundedReceiver<BridgeEvent>,
    /// Ctrl+C.
    pub shutdown: mpsc::UnboundedReceiver<()>,
}

/// What the editor has selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PreviewIntent {
    source: Option<PathBuf>,
    preview_has_focus: bool,
}

/// The panel and the frame connection it talks through.
struct ActivePanel {
    id: u64,
    panel: PreviewPanel,
    events: mpsc::UnboundedReceiver<PanelEvent>,
}

pub struct App {
    registry: Arc<ServerRegistry>,
    fetcher: Arc<dyn DirectoryFetcher>,
    host: HostSender,
    settings: AppSettings,
    panel: Option<ActivePanel>,
    intent: PreviewIntent,
}

impl App {
    pub fn new(
        registry: Arc<ServerRegistry>,
        fetcher: Arc<dyn DirectoryFetcher>,
        host: HostSender,
        settings: AppSettings,
    ) -> Self {
        Self {
            registry,
            fetcher,
            host,
            settings,
            panel: None,
            intent: PreviewIntent::default(),
        }
    }

    /// Serve until the host leaves or shutdown is requested, then stop
    /// every Hugo server.
    pub async fn run(mut self, mut channels: AppChannels) {
        loop {
            tokio::select! {
                Some(cmd) = channels.host.recv() => {
                    if !self.on_host_command(cmd) {
                        break;
                    }
                }
                Some(event) = channels.bridge.recv() => self.on_bridge_event(event),
                Some(event) = next_panel_event(&mut self.panel) => self.on_panel_event(event),
                Some(()) = channels.shutdown.recv() => break,
                else => break,
            }
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if let Some(mut active) = self.panel.take() {
            active.panel.dispose();
        }
        self.registry.shutdown_all().await;
        log!("serve"; "stopped");
    }

    // ========================================================================
    // Host editor
    // ========================================================================

    /// Returns false once the session should end.
    fn on_host_command(&mut self, cmd: HostCommand) -> bool {
        match cmd {
            HostCommand::Open => {
                let event = match self.panel {
                    Some(_) => HostEvent::RevealPanel,
                    None => HostEvent::CreatePanel {
                        bridge_url: self.settings.bridge_url.clone(),
                    },
                };
                self.host.send(event);
            }
            HostCommand::NavigateBack => {
                if let Some(active) = &self.panel {
                    active.panel.navigate_back();
                }
            }
            HostCommand::NavigateForward => {
                if let Some(active) = &self.panel {
                    active.panel.navigate_forward();
                }
            }
            HostCommand::ShowSource => {
                if let Some(active) = &mut self.panel {
                    active.panel.show_source();
                }
                self.drain_outputs();
            }
            HostCommand::OpenExternal => {
                let url = self.panel.as_ref().and_then(|a| a.panel.content_url());
                if let Some(url) = url {
                    self.host.send(HostEvent::OpenExternal { url: url.to_string() });
                }
            }
            HostCommand::CreateLivePreviewPartial => {
                self.host.send(partial_document(&self.settings.script_env));
            }
            HostCommand::Intent {
                source,
                preview_has_focus,
            } => self.follow_intent(source, preview_has_focus),
            HostCommand::Shutdown => return false,
        }
        true
    }

    /// Track the editor selection; the panel follows it when the selected
    /// file changes or focus returns from the panel to an editor.
    fn follow_intent(&mut self, source: Option<PathBuf>, preview_has_focus: bool) {
        // Focusing the panel deselects every editor, not the file
        let source = match source {
            None if preview_has_focus => self.intent.source.clone(),
            source => source,
        };
        let intent = PreviewIntent {
            source,
            preview_has_focus,
        };
        let lost_focus = self.intent.preview_has_focus && !intent.preview_has_focus;
        let changed = intent.source != self.intent.source;
        self.intent = intent;

        if changed || lost_focus {
            if let Some(active) = &mut self.panel {
                active.panel.set_source_file(self.intent.source.as_deref());
            }
            self.drain_outputs();
        }
    }

    // ========================================================================
    // Frame connections
    // ========================================================================

    fn on_bridge_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Opened { id, sender } => {
                if self.panel.is_some() {
                    // Dropping the sender closes the connection
                    log!("bridge"; "refusing frame #{}, a preview is already open", id);
                    return;
                }
                let options = PanelOptions {
                    root: self.settings.root.clone(),
                    checkin_timeout: self.settings.checkin_timeout,
                    title: self.settings.title.clone(),
                };
                let (panel, events) = PreviewPanel::new(
                    Arc::clone(&self.registry),
                    Arc::clone(&self.fetcher),
                    sender,
                    options,
                );
                self.host.send(HostEvent::SetTitle {
                    title: panel.title().to_string(),
                });
                self.host.send(HostEvent::PreviewStatus {
                    showing_preview: panel.showing_preview(),
                });
                self.panel = Some(ActivePanel { id, panel, events });
                log!("bridge"; "preview frame #{} connected", id);
            }
            BridgeEvent::Message { id, msg } => {
                if let Some(active) = self.panel.as_mut().filter(|a| a.id == id) {
                    active.panel.handle(PanelEvent::Frame(msg));
                    self.drain_outputs();
                }
            }
            BridgeEvent::Closed { id } => {
                if self.panel.as_ref().is_some_and(|a| a.id == id) {
                    if let Some(active) = &mut self.panel {
                        active.panel.dispose();
                    }
                    self.drain_outputs();
                    self.panel = None;
                    log!("bridge"; "preview frame #{} closed", id);
                }
            }
        }
    }

    fn on_panel_event(&mut self, event: PanelEvent) {
        if let Some(active) = &mut self.panel {
            active.panel.handle(event);
        }
        self.drain_outputs();
    }

    /// Carry out what the panel asked for.
    fn drain_outputs(&mut self) {
        let Some(active) = self.panel.as_mut() else {
            return;
        };
        loop {
            let outputs = active.panel.take_outputs();
            if outputs.is_empty() {
                break;
            }
            for output in outputs {
                match output {
                    PanelOutput::ContentWanted => {
                        active.panel.set_source_file(self.intent.source.as_deref());
                    }
                    PanelOutput::ExternalLink(url) => {
                        self.host.send(HostEvent::OpenExternal { url: url.to_string() });
                    }
                    PanelOutput::PreviewStatusChanged(showing_preview) => {
                        self.host.send(HostEvent::PreviewStatus { showing_preview });
                    }
                    PanelOutput::CreatePartialRequested => {
                        self.host.send(partial_document(&self.settings.script_env));
                    }
                    PanelOutput::TitleChanged(title) => {
                        self.host.send(HostEvent::SetTitle { title });
                    }
                    PanelOutput::RevealSource { path, offset } => {
                        self.host.send(HostEvent::OpenDocument { path, offset });
                    }
                }
            }
        }
    }
}

/// Next event of the panel; never resolves while there is none.
async fn next_panel_event(panel: &mut Option<ActivePanel>) -> Option<PanelEvent> {
    match panel {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

/// Untitled document holding the live preview partial.
fn partial_document(script_env: &str) -> HostEvent {
    HostEvent::OpenUntitled {
        language: "html".to_string(),
        content: LIVE_PREVIEW_PARTIAL.render(&PartialVars {
            script_env: script_env.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::directory::PageInfo;
    use crate::directory::testing::{ScriptedFetcher, page};
    use crate::hugo::testing::ScriptedLauncher;
    use crate::panel::PanelState;
    use crate::protocol::{FrameCommand, FrameMessage, FrameSender};

    const BRIDGE_URL: &str = "ws://127.0.0.1:40000/";
    const HELLO: &str = "/site/content/posts/hello.md";
    const ABOUT: &str = "/site/content/about.md";

    fn site() -> Vec<PageInfo> {
        vec![
            page("http://localhost:1313/", None, &[]),
            page("http://localhost:1313/posts/hello/", Some(HELLO), &[]),
            page("http://localhost:1313/about/", Some(ABOUT), &[]),
        ]
    }

    struct Harness {
        app: App,
        host: mpsc::UnboundedReceiver<HostEvent>,
        launcher: Arc<ScriptedLauncher>,
    }

    fn harness() -> Harness {
        let launcher = ScriptedLauncher::new(vec![]);
        let registry = Arc::new(ServerRegistry::new(launcher.clone()));
        let (host, host_rx) = HostSender::channel();
        let settings = AppSettings {
            bridge_url: BRIDGE_URL.to_string(),
            root: PathBuf::from("/site"),
            checkin_timeout: Duration::from_millis(1000),
            title: "Hugo Live Preview".to_string(),
            script_env: "HUGO_LIVE_PREVIEW_SCRIPT".to_string(),
        };
        let app = App::new(registry, ScriptedFetcher::new(Ok(site())), host, settings);
        Harness {
            app,
            host: host_rx,
            launcher,
        }
    }

    impl Harness {
        fn connect(&mut self, id: u64) -> mpsc::UnboundedReceiver<FrameCommand> {
            let (sender, rx) = FrameSender::channel();
            self.app.on_bridge_event(BridgeEvent::Opened { id, sender });
            rx
        }

        fn frame(&mut self, id: u64, msg: FrameMessage) {
            self.app.on_bridge_event(BridgeEvent::Message { id, msg });
        }

        fn intent(&mut self, source: Option<&str>, preview_has_focus: bool) {
            self.app.on_host_command(HostCommand::Intent {
                source: source.map(PathBuf::from),
                preview_has_focus,
            });
        }

        async fn step(&mut self) {
            let event = tokio::time::timeout(
                Duration::from_secs(30),
                next_panel_event(&mut self.app.panel),
            )
            .await
            .expect("no panel event")
            .expect("panel channel closed");
            self.app.on_panel_event(event);
        }

        /// Connect frame 1 and run it up to a ready panel.
        async fn start(&mut self) -> mpsc::UnboundedReceiver<FrameCommand> {
            let frame = self.connect(1);
            self.frame(
                1,
                FrameMessage::DiscloseOrigin {
                    origin: "vscode-webview://1".to_string(),
                },
            );
            self.step().await; // server started
            self.step().await; // directory fetched
            frame
        }

        fn host_events(&mut self) -> Vec<HostEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.host.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn set_url(url: &str) -> FrameCommand {
        FrameCommand::SetUrl {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_then_reveals() {
        let mut h = harness();
        h.app.on_host_command(HostCommand::Open);
        assert_eq!(
            h.host_events(),
            vec![HostEvent::CreatePanel {
                bridge_url: BRIDGE_URL.to_string()
            }]
        );

        let _frame = h.connect(1);
        assert_eq!(
            h.host_events(),
            vec![
                HostEvent::SetTitle {
                    title: "Hugo Live Preview".to_string()
                },
                HostEvent::PreviewStatus {
                    showing_preview: false
                },
            ]
        );

        h.app.on_host_command(HostCommand::Open);
        assert_eq!(h.host_events(), vec![HostEvent::RevealPanel]);
    }

    #[tokio::test]
    async fn test_second_frame_is_refused() {
        let mut h = harness();
        let _first = h.connect(1);
        let mut second = h.connect(2);

        assert!(matches!(
            second.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(h.app.panel.as_ref().map(|a| a.id), Some(1));

        // Messages of the refused frame go nowhere
        h.host_events();
        h.frame(2, FrameMessage::CreateLivePreviewPartial);
        assert!(h.host_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_panel_shows_selected_file() {
        let mut h = harness();
        h.intent(Some(HELLO), false);
        let mut frame = h.start().await;

        assert!(drain(&mut frame).contains(&set_url("http://localhost:1313/posts/hello/")));
        assert!(h.host_events().contains(&HostEvent::PreviewStatus {
            showing_preview: true
        }));
        assert_eq!(h.launcher.launched().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intent_changes_are_followed() {
        let mut h = harness();
        let mut frame = h.start().await;
        drain(&mut frame);

        h.intent(Some(ABOUT), false);
        assert_eq!(
            drain(&mut frame)
                .into_iter()
                .filter(|c| matches!(c, FrameCommand::SetUrl { .. }))
                .collect::<Vec<_>>(),
            vec![set_url("http://localhost:1313/about/")]
        );

        // Same selection again: nothing to do
        h.intent(Some(ABOUT), false);
        assert!(drain(&mut frame).is_empty());

        // Focusing the panel keeps the selection
        h.intent(None, true);
        assert!(drain(&mut frame).is_empty());
        assert_eq!(h.app.intent.source.as_deref(), Some(Path::new(ABOUT)));

        // A file without a page
        h.intent(Some("/site/hugo.toml"), false);
        let state = drain(&mut frame).into_iter().find_map(|c| match c {
            FrameCommand::SetState { state } => Some(state),
            _ => None,
        });
        assert_eq!(
            state,
            Some(PanelState::ready_no_preview_available(
                false,
                Some("hugo.toml".to_string())
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_source_and_open_external() {
        let mut h = harness();
        h.intent(Some(HELLO), false);
        let mut frame = h.start().await;
        h.frame(
            1,
            FrameMessage::Checkin {
                href: "http://localhost:1313/posts/hello/".to_string(),
                stext: json!(["Hello"]),
            },
        );
        drain(&mut frame);
        h.host_events();

        h.app.on_host_command(HostCommand::OpenExternal);
        h.app.on_host_command(HostCommand::ShowSource);
        assert_eq!(
            h.host_events(),
            vec![
                HostEvent::OpenExternal {
                    url: "http://localhost:1313/posts/hello/".to_string()
                },
                HostEvent::OpenDocument {
                    path: PathBuf::from(HELLO),
                    offset: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_from_host_and_frame() {
        let mut h = harness();
        h.app.on_host_command(HostCommand::CreateLivePreviewPartial);
        let from_host = h.host_events();
        assert_eq!(from_host.len(), 1);
        let HostEvent::OpenUntitled { language, content } = &from_host[0] else {
            panic!("expected an untitled document");
        };
        assert_eq!(language, "html");
        assert!(content.contains(r#"getenv "HUGO_LIVE_PREVIEW_SCRIPT""#));

        let _frame = h.connect(1);
        h.host_events();
        h.frame(1, FrameMessage::CreateLivePreviewPartial);
        assert_eq!(h.host_events(), from_host);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_frame_releases_panel() {
        let mut h = harness();
        let _frame = h.start().await;

        // Unknown connection ids are ignored
        h.app.on_bridge_event(BridgeEvent::Closed { id: 7 });
        assert!(h.app.panel.is_some());

        h.app.on_bridge_event(BridgeEvent::Closed { id: 1 });
        assert!(h.app.panel.is_none());

        h.host_events();
        h.app.on_host_command(HostCommand::Open);
        assert_eq!(
            h.host_events(),
            vec![HostEvent::CreatePanel {
                bridge_url: BRIDGE_URL.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_run_ends_on_host_shutdown() {
        let h = harness();
        let (host_tx, host) = mpsc::unbounded_channel();
        let (_bridge_tx, bridge) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown) = mpsc::unbounded_channel();
        host_tx.send(HostCommand::Open).unwrap();
        host_tx.send(HostCommand::Shutdown).unwrap();

        let mut events = h.host;
        tokio::time::timeout(
            Duration::from_secs(5),
            h.app.run(AppChannels {
                host,
                bridge,
                shutdown,
            }),
        )
        .await
        .expect("run did not stop");
        assert_eq!(
            events.recv().await,
            Some(HostEvent::CreatePanel {
                bridge_url: BRIDGE_URL.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_run_ends_on_interrupt() {
        let h = harness();
        let (_host_tx, host) = mpsc::unbounded_channel();
        let (_bridge_tx, bridge) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = mpsc::unbounded_channel();
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            h.app.run(AppChannels {
                host,
                bridge,
                shutdown,
            }),
        )
        .await
        .expect("run did not stop");
    }
}
