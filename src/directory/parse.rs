//! Manifest extraction.
//!
//! Every `<script>` tag mentioning `application/json` is a candidate. The
//! first candidate whose body has the expected shape wins:
//!
//! ```json
//! { "pageDirectory": [
//!     { "lang": "en", "base": "http://localhost:1313/",
//!       "pages": [ { "rel": "/posts/a/", "file": "/site/content/posts/a.md",
//!                    "aliases": ["/old-a/"] } ] } ] }
//! ```
//!
//! A single malformed group or page rejects the whole candidate.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::{DirectoryError, PageInfo};

static SCRIPT_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script[^<>]*>").unwrap());
static SCRIPT_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</script").unwrap());
static JSON_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)application/json").unwrap());

#[derive(Deserialize)]
struct RawDirectory {
    #[serde(rename = "pageDirectory")]
    groups: Vec<RawGroup>,
}

#[derive(Deserialize)]
struct RawGroup {
    lang: String,
    base: String,
    pages: Vec<RawPage>,
}

#[derive(Deserialize)]
struct RawPage {
    rel: String,
    file: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Extract the page list from an HTML document.
pub fn parse_page_directory(html: &str) -> Result<Vec<PageInfo>, DirectoryError> {
    for open in SCRIPT_OPEN.find_iter(html) {
        if !JSON_TYPE.is_match(open.as_str()) {
            continue;
        }
        let body_start = open.end();
        let Some(close) = SCRIPT_CLOSE.find_at(html, body_start) else {
            continue;
        };
        if let Some(pages) = import(&html[body_start..close.start()]) {
            return Ok(pages);
        }
    }
    Err(DirectoryError::Malformed)
}

fn import(body: &str) -> Option<Vec<PageInfo>> {
    let raw: RawDirectory = serde_json::from_str(body).ok()?;
    if raw.groups.is_empty() {
        return None;
    }

    let mut pages = Vec::new();
    for group in raw.groups {
        let base = Url::parse(&group.base).ok()?;
        for page in group.pages {
            pages.push(PageInfo {
                url: with_path(&base, &page.rel),
                source: page.file.filter(|f| !f.is_empty()).map(PathBuf::from),
                lang: group.lang.clone(),
                aliases: page.aliases.iter().map(|a| with_path(&base, a)).collect(),
            });
        }
    }
    Some(pages)
}

/// `base` with its path replaced.
fn with_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    url.set_path(path);
    url
}
