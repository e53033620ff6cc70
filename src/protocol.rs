//! Messages exchanged with the embedding frame and the host editor.
//!
//! Frame messages travel as JSON text frames over the bridge WebSocket and
//! carry their type in `msg`. Host messages are JSON lines on stdio, typed by
//! `cmd` (host to us) and `event` (us to host).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::panel::PanelState;

// ============================================================================
// Frame protocol
// ============================================================================

/// Orchestrator to embedding frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum FrameCommand {
    NavigateBack,
    NavigateForward,
    SetUrl { url: String },
    /// Like `SetUrl`, but replaces the current history entry.
    ReplaceUrl { url: String },
    SetState { state: PanelState },
    SetAllowedContentOrigins { origins: Vec<String> },
}

/// Embedding frame (and relayed content frame) to orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum FrameMessage {
    #[serde(alias = "discloseWebviewOrigin")]
    DiscloseOrigin { origin: String },
    RestartServer,
    CreateLivePreviewPartial,

    /// The content frame finished loading `href`.
    Checkin {
        href: String,
        /// Validated on receipt, anything but nested string arrays is dropped.
        #[serde(default)]
        stext: Value,
    },
    NavigateTo { url: String },
    /// Click at a text offset (UTF-16 units) of the displayed page.
    Click { offset: usize },
    UpdateIntersections {
        #[serde(default)]
        hidden: Vec<usize>,
        #[serde(default)]
        revealed: Vec<usize>,
    },
}

impl FrameMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Intersection updates are far too chatty to log.
    pub const fn is_noisy(&self) -> bool {
        matches!(self, Self::UpdateIntersections { .. })
    }
}

/// Outgoing half of a frame connection.
///
/// Sending never fails: once the frame is gone its messages are dropped.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<FrameCommand>,
}

impl FrameSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FrameCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, cmd: FrameCommand) {
        if self.tx.send(cmd).is_err() {
            crate::debug!("frame"; "frame is gone, message dropped");
        }
    }
}

// ============================================================================
// Host protocol
// ============================================================================

/// Host editor to orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    /// Open the preview, or reveal it if it is open.
    Open,
    NavigateBack,
    NavigateForward,
    /// Open the source of the page being previewed.
    ShowSource,
    /// Open the page being previewed in a browser.
    OpenExternal,
    CreateLivePreviewPartial,
    /// The editor's current file selection.
    Intent {
        #[serde(default)]
        source: Option<PathBuf>,
        #[serde(default)]
        preview_has_focus: bool,
    },
    Shutdown,
}

/// Orchestrator to host editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    /// Create the preview panel and load the embedding frame from `bridge_url`.
    CreatePanel { bridge_url: String },
    RevealPanel,
    SetTitle { title: String },
    PreviewStatus { showing_preview: bool },
    OpenDocument {
        path: PathBuf,
        /// UTF-16 offset to put the cursor at.
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<usize>,
    },
    OpenExternal { url: String },
    OpenUntitled { language: String, content: String },
}

impl HostCommand {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone)]
pub struct HostSender {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: HostEvent) {
        if self.tx.send(event).is_err() {
            crate::debug!("host"; "host channel closed, event dropped");
        }
    }
}
