use std::{future::Future, io::Read, sync::Arc};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use reqwest::blocking::Client;

use super::path::normalize;
use super::response::{answer, AssetResponse};
use super::AssetLookup;
use crate::output::logs::ActivityLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<AssetResponse> for FetchedResponse {
    fn from(response: AssetResponse) -> Self {
        Self {
            status: response.status,
            content_type: Some(response.content_type),
            body: response.body,
        }
    }
}

/// The outgoing-request function handed to the inference library.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedResponse>> + Send;
}

/// Plain network fetcher.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

impl HttpFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || fetch_blocking(&url))
            .await
            .map_err(|error| anyhow!("fetch task failed: {error}"))?
    }
}

fn fetch_blocking(url: &str) -> Result<FetchedResponse> {
    let client = Client::builder().build().context("create http client")?;
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("request {url}"))?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let mut body = Vec::new();
    response
        .read_to_end(&mut body)
        .with_context(|| format!("read body of {url}"))?;
    Ok(FetchedResponse {
        status,
        content_type,
        body: Bytes::from(body),
    })
}

/// Same-process responder: wraps the library's fetcher and answers reserved
/// paths from the injected lookup before they ever reach the network.
pub struct InterceptingFetcher<F, L> {
    inner: F,
    lookup: L,
    prefix: String,
    activity: Arc<ActivityLog>,
}

impl<F, L> InterceptingFetcher<F, L>
where
    F: AssetFetcher,
    L: AssetLookup,
{
    pub fn new(inner: F, lookup: L, prefix: impl Into<String>, activity: Arc<ActivityLog>) -> Self {
        Self {
            inner,
            lookup,
            prefix: prefix.into(),
            activity,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F, L> AssetFetcher for InterceptingFetcher<F, L>
where
    F: AssetFetcher,
    L: AssetLookup,
{
    async fn fetch(&self, url: &str) -> Result<FetchedResponse> {
        if let Some(relative) = normalize(url, &self.prefix) {
            let response = answer(&self.lookup, &relative, "in-process", &self.activity);
            return Ok(response.into());
        }
        self.inner.fetch(url).await
    }
}
