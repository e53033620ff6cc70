//! `directory` command: dump the page directory of a running server.

use std::io::Write;

use anyhow::{Context, Result};
use url::Url;

use crate::directory::{DirectoryFetcher, HttpFetcher, PageInfo};
use crate::log;

pub fn print_directory(url: &Url, pretty: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let fetcher = HttpFetcher::new()?;
    let pages = runtime
        .block_on(fetcher.fetch(url))
        .with_context(|| format!("cannot read the page directory of {url}"))?;

    log!("directory"; "{} pages", pages.len());
    let json = to_json(&pages, pretty)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

fn to_json(pages: &[PageInfo], pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(pages)
    } else {
        serde_json::to_string(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::page;
    use serde_json::json;

    #[test]
    fn test_json_output() {
        let pages = vec![page(
            "http://localhost:1313/posts/a/",
            Some("/site/content/posts/a.md"),
            &[],
        )];
        let value: serde_json::Value = serde_json::from_str(&to_json(&pages, false).unwrap()).unwrap();
        assert_eq!(
            value,
            json!([{
                "url": "http://localhost:1313/posts/a/",
                "source": "/site/content/posts/a.md",
                "lang": "en"
            }])
        );
        assert!(to_json(&pages, true).unwrap().contains('\n'));
    }
}
