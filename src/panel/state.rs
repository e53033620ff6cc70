//! What the preview panel shows.
//!
//! ```text
//! Initialising --origin disclosed--> ServerStarting --server up--> Ready
//!                                          |    ^                    |
//!                                   failed |    | restart            | rebuild / load /
//!                                          v    |                    | directory update
//!                                       ServerFailed <--terminated-- BuildFailed
//!                                                                    SiteMisconfigured
//! ```
//!
//! The embedding frame renders a status screen per state; `Ready` renders the
//! content frame (or a "no preview" placeholder).

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PanelState {
    /// Waiting for the frame to disclose its origin.
    Initialising,
    ServerStarting,
    /// The server failed to start or died. The user may retry.
    ServerFailed { err: String },
    /// Hugo reported errors; its own error page is shown as is.
    BuildFailed,
    /// The site lacks the live preview partial, or it is broken.
    SiteMisconfigured {
        checkin_timed_out: bool,
        page_directory_unavailable: bool,
    },
    Ready {
        preview_status: PreviewStatus,
        /// The selected file when no preview is available for it.
        #[serde(skip_serializing_if = "Option::is_none")]
        source_path: Option<String>,
    },
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewStatus {
    ShowingPreview,
    /// Placeholder instead of content.
    NoPreviewAvailable,
    /// Content stays visible under a "no preview for this file" banner.
    NoPreviewAvailableBanner,
}

impl PanelState {
    pub const fn initialising() -> Self {
        Self::Initialising
    }

    pub const fn server_starting() -> Self {
        Self::ServerStarting
    }

    pub fn server_failed(err: impl ToString) -> Self {
        Self::ServerFailed {
            err: err.to_string(),
        }
    }

    pub const fn build_failed() -> Self {
        Self::BuildFailed
    }

    pub const fn site_misconfigured(checkin_timed_out: bool, page_directory_unavailable: bool) -> Self {
        Self::SiteMisconfigured {
            checkin_timed_out,
            page_directory_unavailable,
        }
    }

    pub const fn ready_showing_preview() -> Self {
        Self::Ready {
            preview_status: PreviewStatus::ShowingPreview,
            source_path: None,
        }
    }

    /// Nothing to preview for `source_path`. The banner variant is used when
    /// some page is on display and a file was selected.
    pub fn ready_no_preview_available(has_display: bool, source_path: Option<String>) -> Self {
        let preview_status = if has_display && source_path.is_some() {
            PreviewStatus::NoPreviewAvailableBanner
        } else {
            PreviewStatus::NoPreviewAvailable
        };
        Self::Ready {
            preview_status,
            source_path,
        }
    }

    pub const fn disposed() -> Self {
        Self::Disposed
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initialising => "initialising",
            Self::ServerStarting => "serverStarting",
            Self::ServerFailed { .. } => "serverFailed",
            Self::BuildFailed => "buildFailed",
            Self::SiteMisconfigured { .. } => "siteMisconfigured",
            Self::Ready { .. } => "ready",
            Self::Disposed => "disposed",
        }
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// States that follow server, directory and checkin changes.
    pub const fn accepts_reconcile(&self) -> bool {
        matches!(
            self,
            Self::BuildFailed | Self::SiteMisconfigured { .. } | Self::Ready { .. }
        )
    }

    /// Whether page content is visible, either fully or under a banner.
    pub fn showing_preview(&self) -> bool {
        matches!(self, Self::Ready { preview_status, .. } if *preview_status != PreviewStatus::NoPreviewAvailable)
    }

    pub fn preview_status(&self) -> Option<PreviewStatus> {
        match self {
            Self::Ready { preview_status, .. } => Some(*preview_status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_no_preview_banner() {
        let state = PanelState::ready_no_preview_available(true, Some("layouts/index.html".into()));
        assert_eq!(state.preview_status(), Some(PreviewStatus::NoPreviewAvailableBanner));
        assert!(state.showing_preview());

        let state = PanelState::ready_no_preview_available(false, Some("a.md".into()));
        assert_eq!(state.preview_status(), Some(PreviewStatus::NoPreviewAvailable));
        assert!(!state.showing_preview());

        let state = PanelState::ready_no_preview_available(true, None);
        assert_eq!(state.preview_status(), Some(PreviewStatus::NoPreviewAvailable));
    }

    #[test]
    fn test_reconcile_states() {
        assert!(PanelState::build_failed().accepts_reconcile());
        assert!(PanelState::site_misconfigured(false, true).accepts_reconcile());
        assert!(PanelState::ready_showing_preview().accepts_reconcile());
        assert!(!PanelState::server_starting().accepts_reconcile());
        assert!(!PanelState::server_failed("x").accepts_reconcile());
        assert!(!PanelState::disposed().accepts_reconcile());
    }

    #[test]
    fn test_serialized_shape() {
        assert_eq!(
            serde_json::to_value(PanelState::ready_no_preview_available(true, Some("a.md".into())))
                .unwrap(),
            json!({"type": "ready", "previewStatus": "noPreviewAvailableBanner", "sourcePath": "a.md"})
        );
        assert_eq!(
            serde_json::to_value(PanelState::server_failed("Hugo process killed by signal: 9"))
                .unwrap(),
            json!({"type": "serverFailed", "err": "Hugo process killed by signal: 9"})
        );
        assert_eq!(
            serde_json::to_value(PanelState::initialising()).unwrap(),
            json!({"type": "initialising"})
        );
    }
}
