//! Manifest retrieval over HTTP.

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use url::Url;

use super::{DirectoryError, PageInfo, parse_page_directory};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type FetchResult = Result<Vec<PageInfo>, DirectoryError>;

/// Source of page directories. Swapped out in tests.
pub trait DirectoryFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, FetchResult>;
}

/// Fetches the manifest from the running Hugo server.
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        // Hugo listens on loopback; a system proxy would only get in the way
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self { http })
    }
}

impl DirectoryFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, FetchResult> {
        let http = self.http.clone();
        let url = url.clone();
        async move { fetch_page_directory(&http, url).await }.boxed()
    }
}

async fn fetch_page_directory(http: &reqwest::Client, url: Url) -> FetchResult {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DirectoryError::UnsupportedScheme(url.scheme().to_string()));
    }

    crate::debug!("directory"; "fetching {}", url);
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;
    if resp.status() != StatusCode::OK {
        return Err(DirectoryError::Http(resp.status().as_u16()));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;
    parse_page_directory(&body)
}
