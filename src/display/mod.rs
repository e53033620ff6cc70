//! What the content frame actually shows.
//!
//! Navigation requests go out as `setUrl`/`replaceUrl`; the loaded page
//! answers with a `checkin` carrying its address and text. A page that stays
//! silent past the checkin timeout most likely lacks the payload script, which
//! is reported through a sticky flag until the next checkin.
//!
//! Every request re-arms the timer. Each arm gets a generation number, and a
//! timeout only counts if its generation is still the current one.

pub mod stext;

use std::time::Duration;

use rustc_hash::FxHashSet;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

pub use stext::{SText, TextIndex, TextNode};

use crate::panel::PanelEvent;
use crate::protocol::{FrameCommand, FrameSender};

/// The page on display, replaced wholesale on every checkin.
#[derive(Debug, Clone)]
pub struct Display {
    pub url: Url,
    pub content: SText,
    pub index: TextIndex,
}

pub struct DisplayService {
    frame: FrameSender,
    events: mpsc::UnboundedSender<PanelEvent>,
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    display: Option<Display>,
    checkin_timed_out: bool,
    /// Node ids the content frame reports as on screen.
    visible: FxHashSet<usize>,
}

impl DisplayService {
    pub fn new(
        frame: FrameSender,
        events: mpsc::UnboundedSender<PanelEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            frame,
            events,
            timeout,
            timer: None,
            generation: 0,
            display: None,
            checkin_timed_out: false,
            visible: FxHashSet::default(),
        }
    }

    /// Navigate to `url`. Loading the page on display reloads it.
    pub fn set_url(&mut self, url: &Url) {
        self.request(FrameCommand::SetUrl {
            url: url.to_string(),
        });
    }

    /// Navigate without pushing a history entry.
    pub fn replace_url(&mut self, url: &Url) {
        self.request(FrameCommand::ReplaceUrl {
            url: url.to_string(),
        });
    }

    fn request(&mut self, cmd: FrameCommand) {
        crate::debug!("display"; "{:?}", cmd);
        self.frame.send(cmd);
        self.arm_timer();
    }

    fn arm_timer(&mut self) {
        self.cancel_timer();
        let generation = self.generation;
        let timeout = self.timeout;
        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(PanelEvent::CheckinTimeout { generation });
        }));
    }

    /// Abort the pending timer and invalidate any timeout already queued.
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }

    /// Returns `true` if the timeout is current, i.e. a load event is due.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.timer.is_none() {
            return false;
        }
        self.timer = None;
        self.checkin_timed_out = true;
        crate::debug!("display"; "checkin timed out");
        true
    }

    /// Record a checkin. Returns `true` if a load event is due.
    pub fn on_checkin(&mut self, href: &str, stext: Value) -> bool {
        let url = match Url::parse(href) {
            Ok(url) => url,
            Err(e) => {
                crate::debug!("display"; "ignoring checkin from {}: {}", href, e);
                return false;
            }
        };
        self.cancel_timer();

        let content = SText::from_value(stext).unwrap_or_default();
        let index = TextIndex::build(&content);
        crate::debug!("display"; "checkin {} ({} nodes)", url, index.len());
        self.display = Some(Display {
            url,
            content,
            index,
        });
        self.checkin_timed_out = false;
        self.visible.clear();
        true
    }

    pub fn update_intersections(&mut self, hidden: &[usize], revealed: &[usize]) {
        for id in hidden {
            self.visible.remove(id);
        }
        self.visible.extend(revealed.iter().copied());
    }

    /// Text offset of the first visible node.
    pub fn visible_offset(&self) -> Option<usize> {
        let index = &self.display.as_ref()?.index;
        self.visible
            .iter()
            .filter_map(|&id| index.node(id))
            .map(|node| node.offset)
            .min()
    }

    pub fn display(&self) -> Option<&Display> {
        self.display.as_ref()
    }

    pub const fn checkin_timed_out(&self) -> bool {
        self.checkin_timed_out
    }

    pub fn clear_timed_out(&mut self) {
        self.checkin_timed_out = false;
    }

    /// Forget everything about the current page.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.display = None;
        self.checkin_timed_out = false;
        self.visible.clear();
    }
}

impl Drop for DisplayService {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_millis(1000);

    struct Harness {
        service: DisplayService,
        frame: mpsc::UnboundedReceiver<FrameCommand>,
        events: mpsc::UnboundedReceiver<PanelEvent>,
    }

    fn harness() -> Harness {
        let (frame_tx, frame) = FrameSender::channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        Harness {
            service: DisplayService::new(frame_tx, events_tx, TIMEOUT),
            frame,
            events,
        }
    }

    impl Harness {
        /// Wait for the next timeout event and feed it back.
        async fn fire_timeout(&mut self) -> bool {
            match self.events.recv().await {
                Some(PanelEvent::CheckinTimeout { generation }) => self.service.on_timeout(generation),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_url_sends_and_times_out() {
        let mut h = harness();
        h.service.set_url(&url("http://localhost:1313/a/"));
        assert_eq!(
            h.frame.try_recv().unwrap(),
            FrameCommand::SetUrl {
                url: "http://localhost:1313/a/".into()
            }
        );

        assert!(h.fire_timeout().await);
        assert!(h.service.checkin_timed_out());
        assert!(h.service.display().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkin_cancels_timer() {
        let mut h = harness();
        h.service.replace_url(&url("http://localhost:1313/a/"));
        assert!(h.service.on_checkin("http://localhost:1313/a/", json!(["Hello"])));

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(h.events.try_recv().is_err());
        assert!(!h.service.checkin_timed_out());
        assert_eq!(h.service.display().unwrap().index.text(), "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_only_latest_counts() {
        let mut h = harness();
        h.service.set_url(&url("http://localhost:1313/a/"));
        let stale = h.service.generation;
        tokio::time::sleep(TIMEOUT / 2).await;
        h.service.set_url(&url("http://localhost:1313/b/"));

        // A timeout from the first request that slipped through is ignored
        assert!(!h.service.on_timeout(stale));
        assert!(!h.service.checkin_timed_out());
        assert!(h.fire_timeout().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_checkin_clears_flag() {
        let mut h = harness();
        h.service.set_url(&url("http://localhost:1313/a/"));
        assert!(h.fire_timeout().await);
        assert!(h.service.checkin_timed_out());

        assert!(h.service.on_checkin("http://localhost:1313/a/", json!(["late"])));
        assert!(!h.service.checkin_timed_out());
        assert_eq!(h.service.display().unwrap().url.path(), "/a/");
    }

    #[tokio::test]
    async fn test_checkin_validation() {
        let mut h = harness();
        assert!(!h.service.on_checkin("not a url", json!(["x"])));
        assert!(h.service.display().is_none());

        assert!(h.service.on_checkin("http://localhost:1313/", json!({"bad": 1})));
        let display = h.service.display().unwrap();
        assert_eq!(display.content, SText::Node(vec![]));
    }

    #[tokio::test]
    async fn test_visible_offset() {
        let mut h = harness();
        // 0:[ 1:"Title" 2:[ 3:"Body" ] 4:"Footer" ]
        h.service
            .on_checkin("http://localhost:1313/", json!(["Title", ["Body"], "Footer"]));
        assert_eq!(h.service.visible_offset(), None);

        h.service.update_intersections(&[], &[3, 4]);
        assert_eq!(h.service.visible_offset(), Some(5));
        h.service.update_intersections(&[3], &[1]);
        assert_eq!(h.service.visible_offset(), Some(0));
        h.service.update_intersections(&[1], &[99]);
        assert_eq!(h.service.visible_offset(), Some(9));

        // A new page starts with nothing visible
        h.service.on_checkin("http://localhost:1313/b/", json!(["B"]));
        assert_eq!(h.service.visible_offset(), None);
    }

    #[tokio::test]
    async fn test_reset() {
        let mut h = harness();
        h.service.on_checkin("http://localhost:1313/", json!(["x"]));
        h.service.set_url(&url("http://localhost:1313/b/"));
        h.service.reset();
        assert!(h.service.display().is_none());
        assert!(h.service.timer.is_none());
    }
}
