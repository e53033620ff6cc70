//! The preview panel state machine.
//!
//! A panel owns one frame connection. It obtains a Hugo server for the
//! frame's origin, keeps a page directory for it, follows what the content
//! frame displays and folds all of that into a single [`PanelState`].
//!
//! The panel is driven by [`PreviewPanel::handle`] from one task. Background
//! work (server start, directory fetch, checkin timer, source lookups) runs
//! in spawned tasks that report back through the panel's event channel.
//! Requests for the owner (open a document, follow an external link) are
//! queued and collected with [`PreviewPanel::take_outputs`].

pub mod click;
pub mod event;
pub mod state;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

pub use event::{PanelEvent, PanelOutput};
pub use state::{PanelState, PreviewStatus};

use crate::directory::{DirectoryFetcher, PageDirectory};
use crate::display::DisplayService;
use crate::hugo::registry::ServerResult;
use crate::hugo::{HugoServer, ServerError, ServerEvent, ServerRegistry};
use crate::protocol::{FrameCommand, FrameMessage, FrameSender};

pub struct PanelOptions {
    /// Site root, for reporting selected files relative to it.
    pub root: PathBuf,
    pub checkin_timeout: Duration,
    /// Title when no page is previewed.
    pub title: String,
}

pub struct PreviewPanel {
    registry: Arc<ServerRegistry>,
    fetcher: Arc<dyn DirectoryFetcher>,
    frame: FrameSender,
    events: mpsc::UnboundedSender<PanelEvent>,
    root: PathBuf,
    generic_title: String,

    state: PanelState,
    title: String,
    origin: Option<String>,
    /// Bumped on every server request; stale results are dropped.
    attempt: u64,
    server: Option<Arc<HugoServer>>,
    subscription: Option<JoinHandle<()>>,
    directory: Option<PageDirectory>,
    display: DisplayService,
    outputs: Vec<PanelOutput>,
}

impl PreviewPanel {
    pub fn new(
        registry: Arc<ServerRegistry>,
        fetcher: Arc<dyn DirectoryFetcher>,
        frame: FrameSender,
        options: PanelOptions,
    ) -> (Self, mpsc::UnboundedReceiver<PanelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let display = DisplayService::new(frame.clone(), events.clone(), options.checkin_timeout);
        let panel = Self {
            registry,
            fetcher,
            frame,
            events,
            root: options.root,
            title: options.title.clone(),
            generic_title: options.title,
            state: PanelState::initialising(),
            origin: None,
            attempt: 0,
            server: None,
            subscription: None,
            directory: None,
            display,
            outputs: Vec::new(),
        };
        (panel, rx)
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn showing_preview(&self) -> bool {
        self.state.showing_preview()
    }

    /// Drain the requests queued for the owner.
    pub fn take_outputs(&mut self) -> Vec<PanelOutput> {
        std::mem::take(&mut self.outputs)
    }

    pub fn handle(&mut self, event: PanelEvent) {
        if self.state == PanelState::Disposed {
            return;
        }
        match event {
            PanelEvent::Frame(msg) => self.on_frame_message(msg),
            PanelEvent::ServerStarted { attempt, result } => self.on_server_started(attempt, result),
            PanelEvent::Server { attempt, event } if attempt == self.attempt => match event {
                ServerEvent::Rebuilt => {
                    self.display.clear_timed_out();
                    self.refresh_directory();
                    self.reconcile();
                }
                ServerEvent::Terminated(err) => self.server_failed(&err),
            },
            PanelEvent::Server { .. } => {}
            PanelEvent::DirectoryFetched {
                attempt,
                token,
                result,
            } => {
                if attempt != self.attempt {
                    return;
                }
                if let Some(directory) = self.directory.as_mut() {
                    directory.apply(token, result);
                    self.reconcile();
                }
            }
            PanelEvent::CheckinTimeout { generation } => {
                if self.display.on_timeout(generation) {
                    self.reconcile();
                }
            }
            PanelEvent::SourceLocated { path, offset } => {
                self.outputs.push(PanelOutput::RevealSource {
                    path,
                    offset: Some(offset),
                });
            }
        }
    }

    fn on_frame_message(&mut self, msg: FrameMessage) {
        if !msg.is_noisy() {
            crate::debug!("panel"; "{:?}", msg);
        }
        match msg {
            FrameMessage::DiscloseOrigin { origin } => {
                if self.state == PanelState::Initialising {
                    self.origin = Some(origin);
                    self.provision_server();
                }
            }
            FrameMessage::RestartServer => {
                if matches!(self.state, PanelState::ServerFailed { .. }) {
                    self.restart();
                }
            }
            FrameMessage::CreateLivePreviewPartial => {
                self.outputs.push(PanelOutput::CreatePartialRequested);
            }
            FrameMessage::Checkin { href, stext } => {
                if self.display.on_checkin(&href, stext) {
                    self.reconcile();
                }
            }
            FrameMessage::NavigateTo { url } => self.navigate_to(&url),
            FrameMessage::Click { offset } => self.handle_click(offset),
            FrameMessage::UpdateIntersections { hidden, revealed } => {
                self.display.update_intersections(&hidden, &revealed);
            }
        }
    }

    // ========================================================================
    // Server lifecycle
    // ========================================================================

    fn provision_server(&mut self) {
        let Some(origin) = self.origin.clone() else {
            crate::log!("panel"; "frame origin not yet known");
            return;
        };
        self.set_state(PanelState::server_starting());

        self.attempt += 1;
        let attempt = self.attempt;
        let pending = self.registry.request_server(&origin);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = events.send(PanelEvent::ServerStarted { attempt, result });
        });
    }

    fn on_server_started(&mut self, attempt: u64, result: ServerResult) {
        if attempt != self.attempt || self.state != PanelState::ServerStarting {
            return;
        }
        match result {
            Ok(server) => self.attach(server),
            Err(err) => self.server_failed(&err),
        }
    }

    fn attach(&mut self, server: Arc<HugoServer>) {
        self.frame.send(FrameCommand::SetAllowedContentOrigins {
            origins: server.origins(),
        });
        self.subscription = Some(self.subscribe(&server));
        self.server = Some(Arc::clone(&server));
        self.directory = Some(PageDirectory::new(
            Arc::clone(&server),
            Arc::clone(&self.fetcher),
        ));
        self.refresh_directory();

        // Died between start and subscription
        if let Some(err) = server.termination_error() {
            self.server_failed(&err);
            return;
        }
        self.set_state(PanelState::ready_no_preview_available(false, None));
    }

    /// Forward server events into the panel's channel.
    fn subscribe(&self, server: &HugoServer) -> JoinHandle<()> {
        let mut rx = server.subscribe();
        let events = self.events.clone();
        let attempt = self.attempt;
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    // Missed rebuilds collapse into one
                    Err(RecvError::Lagged(_)) => ServerEvent::Rebuilt,
                    Err(RecvError::Closed) => break,
                };
                let last = matches!(event, ServerEvent::Terminated(_));
                if events.send(PanelEvent::Server { attempt, event }).is_err() || last {
                    break;
                }
            }
        })
    }

    fn server_failed(&mut self, err: &ServerError) {
        crate::log!("panel"; "server failed: {}", err);
        self.frame.send(FrameCommand::SetAllowedContentOrigins { origins: Vec::new() });
        self.set_state(PanelState::server_failed(err));
    }

    /// Drop everything tied to the failed server and ask for a new one.
    fn restart(&mut self) {
        self.release_server();
        self.display.reset();
        self.provision_server();
    }

    fn release_server(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
        }
        self.server = None;
        self.directory = None;
    }

    fn refresh_directory(&mut self) {
        let Some(directory) = self.directory.as_mut() else {
            return;
        };
        let events = self.events.clone();
        let attempt = self.attempt;
        directory.refresh(move |token, result| {
            let _ = events.send(PanelEvent::DirectoryFetched {
                attempt,
                token,
                result,
            });
        });
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    fn reconcile(&mut self) {
        let (Some(server), Some(directory)) = (&self.server, &self.directory) else {
            return;
        };
        if !self.state.accepts_reconcile() {
            return;
        }

        // The displayed page's slug may have been edited
        let corrected = self.display.display().and_then(|display| {
            let source = directory.source_file_by_url(&display.url)?;
            let url = directory.url_by_source_file(source, Some(&display.url))?;
            (url != display.url).then_some(url)
        });

        let build_failed = server.has_build_errors();
        let checkin_timed_out = self.display.checkin_timed_out();
        let unavailable = directory.is_unavailable();

        if let Some(url) = corrected {
            crate::debug!("panel"; "page moved to {}", url);
            self.display.replace_url(&url);
        }

        if build_failed {
            self.set_state(PanelState::build_failed());
        } else if checkin_timed_out || unavailable {
            self.set_state(PanelState::site_misconfigured(checkin_timed_out, unavailable));
        } else if !self.state.is_ready() {
            self.set_state(PanelState::ready_no_preview_available(false, None));
        } else {
            self.update_title();
        }

        if self.state.is_ready() && self.state.preview_status() != Some(PreviewStatus::ShowingPreview) {
            self.outputs.push(PanelOutput::ContentWanted);
        }
    }

    fn set_state(&mut self, state: PanelState) {
        let was_showing = self.state.showing_preview();
        crate::debug!("panel"; "{} -> {}", self.state.name(), state.name());
        self.state = state;
        self.update_title();
        self.frame.send(FrameCommand::SetState {
            state: self.state.clone(),
        });
        let showing = self.state.showing_preview();
        if was_showing != showing {
            self.outputs.push(PanelOutput::PreviewStatusChanged(showing));
        }
    }

    fn update_title(&mut self) {
        let title = match self.display.display() {
            Some(display) if self.state.showing_preview() => display.url.path().to_string(),
            _ => self.generic_title.clone(),
        };
        if title != self.title {
            self.title = title.clone();
            self.outputs.push(PanelOutput::TitleChanged(title));
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Preview `source`, the file selected in the editor.
    pub fn set_source_file(&mut self, source: Option<&Path>) {
        if !self.state.is_ready() {
            return;
        }
        let has_display = self.display.display().is_some();
        let relative = source.map(|p| self.relative_path(p));

        let target = source.zip(self.directory.as_ref()).and_then(|(source, directory)| {
            let url = directory.url_by_source_file(source, None)?;
            // Already on display, possibly under an alias: don't reload
            let displayed = self
                .display
                .display()
                .and_then(|d| directory.source_file_by_url(&d.url));
            Some((url, displayed == Some(source)))
        });

        match target {
            None => self.set_state(PanelState::ready_no_preview_available(has_display, relative)),
            Some((url, on_display)) => {
                if !on_display {
                    self.display.set_url(&url);
                }
                self.set_state(PanelState::ready_showing_preview());
            }
        }
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn navigate_to(&mut self, url: &str) {
        if !self.showing_preview() {
            return;
        }
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                crate::debug!("panel"; "ignoring navigation to {}: {}", url, e);
                return;
            }
        };
        // Multilingual sites serve each language from its own port
        if self.server.as_ref().is_some_and(|s| s.can_serve_url(&url)) {
            self.display.set_url(&url);
        } else {
            self.outputs.push(PanelOutput::ExternalLink(url));
        }
    }

    pub fn navigate_back(&self) {
        if self.showing_preview() {
            self.frame.send(FrameCommand::NavigateBack);
        }
    }

    pub fn navigate_forward(&self) {
        if self.showing_preview() {
            self.frame.send(FrameCommand::NavigateForward);
        }
    }

    /// URL of the page on display, unless a placeholder is shown.
    pub fn content_url(&self) -> Option<Url> {
        if !self.showing_preview() {
            return None;
        }
        self.display.display().map(|d| d.url.clone())
    }

    /// Source file of the page on display.
    pub fn source_url(&self) -> Option<PathBuf> {
        let url = self.content_url()?;
        let directory = self.directory.as_ref()?;
        directory.source_file_by_url(&url).map(Path::to_path_buf)
    }

    // ========================================================================
    // Source lookups
    // ========================================================================

    /// Reveal the source of the page on display, at the first visible text
    /// when the frame reported any.
    pub fn show_source(&mut self) {
        let Some(path) = self.source_url() else {
            return;
        };
        match self.display.visible_offset() {
            Some(offset) => self.locate(path, offset),
            None => self.outputs.push(PanelOutput::RevealSource { path, offset: None }),
        }
    }

    fn handle_click(&mut self, offset: usize) {
        if let Some(path) = self.source_url() {
            self.locate(path, offset);
        }
    }

    /// Map `offset` in the displayed text to `path` in the background.
    fn locate(&self, path: PathBuf, offset: usize) {
        let Some(display) = self.display.display() else {
            return;
        };
        let displayed = display.index.text().to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            let source = match tokio::fs::read_to_string(&path).await {
                Ok(source) => source,
                Err(e) => {
                    crate::log!("panel"; "cannot read {}: {}", path.display(), e);
                    return;
                }
            };
            let mapped =
                tokio::task::spawn_blocking(move || click::map_click(&source, &displayed, offset)).await;
            match mapped {
                Ok(offset) => {
                    let _ = events.send(PanelEvent::SourceLocated { path, offset });
                }
                Err(e) => crate::debug!("panel"; "click mapping failed: {}", e),
            }
        });
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// The frame is gone. Final; the server is shut down with the panel.
    pub fn dispose(&mut self) {
        if self.state == PanelState::Disposed {
            return;
        }
        self.set_state(PanelState::disposed());
        self.display.reset();
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        self.release_server();
    }
}

impl Drop for PreviewPanel {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
        }
    }
}
