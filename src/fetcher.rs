use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

/// How long a single fetch may take before it counts as failed.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("tinysearch crawler/", env!("CARGO_PKG_VERSION"));

/// Downloads pages for the crawler. The crawler only cares about the final
/// url after redirects and the body, so anything that can produce those can
/// stand in for the network, which is what the tests do.
pub trait Fetch: Sync {
    /// Downloads `url` and returns the final url and the response body.
    fn fetch(&self, url: &str) -> anyhow::Result<(String, String)>;
}

/// The real fetcher. One client is built up front and reused for every
/// request so connections get pooled across the crawl.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("build http client")?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<(String, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request {url}"))?;

        if response.status() != StatusCode::OK {
            bail!("server returned status {}", response.status());
        }

        let final_url = response.url().to_string();
        let body = response.text().context("read response body")?;
        Ok((final_url, body))
    }
}
