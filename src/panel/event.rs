use std::path::PathBuf;

use url::Url;

use crate::directory::fetch::FetchResult;
use crate::hugo::ServerEvent;
use crate::hugo::registry::ServerResult;
use crate::protocol::FrameMessage;

/// Inputs of the panel state machine.
///
/// Results of background work carry the server attempt (or timer
/// generation) they belong to; the panel drops the ones that are stale.
#[derive(Debug)]
pub enum PanelEvent {
    Frame(FrameMessage),
    ServerStarted { attempt: u64, result: ServerResult },
    Server { attempt: u64, event: ServerEvent },
    DirectoryFetched {
        attempt: u64,
        token: u64,
        result: FetchResult,
    },
    CheckinTimeout { generation: u64 },
    /// A click or "show source" request resolved to a source position.
    SourceLocated { path: PathBuf, offset: usize },
}

/// Things the panel asks of its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelOutput {
    /// Nothing is previewed; the current selection should be supplied again.
    ContentWanted,
    /// A link leading outside the site was followed.
    ExternalLink(Url),
    PreviewStatusChanged(bool),
    CreatePartialRequested,
    TitleChanged(String),
    RevealSource { path: PathBuf, offset: Option<usize> },
}
