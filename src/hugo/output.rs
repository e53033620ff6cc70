//! Hugo console output analysis.
//!
//! Hugo reports its lifecycle only through the console, so the supervisor
//! reads both output streams and feeds complete lines through a small state
//! machine:
//!
//! ```text
//! Init --"Press Ctrl+C to stop"--> Ready --"Change detected"--> Rebuilding
//!                                    ^                              |
//!                                    +-------"Total in N ms"--------+
//!
//! any phase --process exit--> Terminated
//! ```
//!
//! Error lines are collected in every phase and only cleared when a rebuild
//! starts, so a build that reports errors and then finishes keeps them.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SERVER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Web Server is available at (http\S+)").unwrap());
static INIT_DONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Press Ctrl\+C to stop").unwrap());
static REBUILD_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Change detected, rebuilding site").unwrap());
static REBUILD_DONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Total in \d+ ms").unwrap());
static BUILD_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Error|ERROR)[^:]*:\s+(.*)").unwrap());

// ============================================================================
// Line buffering
// ============================================================================

/// Accumulates raw output bytes and yields complete lines.
///
/// Buffering happens on bytes, so a chunk boundary falling inside a
/// multi-byte character is harmless.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, returning every line it completed (without `\n`/`\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the unterminated tail once the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ============================================================================
// Lifecycle analysis
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Ready,
    Rebuilding,
    Terminated,
}

/// Lifecycle transitions recognised in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Initialisation finished with at least one server URL.
    Ready { urls: Vec<Url>, errors: Vec<String> },
    /// Initialisation finished but no server URL was announced.
    MissingUrl,
    /// A rebuild cycle completed; `errors` replaces the previous list.
    Rebuilt { errors: Vec<String> },
}

#[derive(Debug)]
pub struct OutputAnalyser {
    phase: Phase,
    urls: Vec<Url>,
    errors: Vec<String>,
}

impl Default for OutputAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputAnalyser {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Init,
            urls: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Errors collected since the last rebuild started.
    pub fn pending_errors(&self) -> &[String] {
        &self.errors
    }

    /// Process one complete line.
    pub fn feed_line(&mut self, line: &str) -> Option<Signal> {
        if let Some(caps) = BUILD_ERROR.captures(line) {
            self.errors.push(caps[1].to_string());
        }

        match self.phase {
            Phase::Init => {
                if let Some(caps) = SERVER_URL.captures(line) {
                    match Url::parse(&caps[1]) {
                        Ok(url) => self.urls.push(url),
                        Err(e) => crate::debug!("hugo"; "ignoring server url {}: {}", &caps[1], e),
                    }
                }
                if INIT_DONE.is_match(line) {
                    if self.urls.is_empty() {
                        self.phase = Phase::Terminated;
                        return Some(Signal::MissingUrl);
                    }
                    self.phase = Phase::Ready;
                    return Some(Signal::Ready {
                        urls: std::mem::take(&mut self.urls),
                        errors: self.errors.clone(),
                    });
                }
                None
            }
            Phase::Ready => {
                if REBUILD_START.is_match(line) {
                    self.phase = Phase::Rebuilding;
                    self.errors.clear();
                }
                None
            }
            Phase::Rebuilding => {
                if REBUILD_DONE.is_match(line) {
                    self.phase = Phase::Ready;
                    return Some(Signal::Rebuilt {
                        errors: self.errors.clone(),
                    });
                }
                None
            }
            Phase::Terminated => None,
        }
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }
}

// ============================================================================
// Tests
// ============================================================================
