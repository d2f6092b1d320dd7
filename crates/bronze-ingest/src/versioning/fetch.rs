use super::ResolveError;
use reqwest::{header::HeaderMap, Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = concat!("bronze-ingest/", env!("CARGO_PKG_VERSION"));

/// HTTP client for resolver lookups: one timeout per call, no retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Response, ResolveError> {
        debug!(url, "Fetching");
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| ResolveError::Http {
                url: url.to_string(),
                source,
            })?;
        check_status(url, response)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, ResolveError> {
        self.get(url, &HeaderMap::new())
            .await?
            .text()
            .await
            .map_err(|source| ResolveError::Http {
                url: url.to_string(),
                source,
            })
    }

    pub async fn get_json(&self, url: &str, headers: &HeaderMap) -> Result<Value, ResolveError> {
        self.get(url, headers)
            .await?
            .json()
            .await
            .map_err(|source| ResolveError::Http {
                url: url.to_string(),
                source,
            })
    }

    /// HEAD request following redirects. Non-2xx statuses are returned, not raised.
    pub async fn head(&self, url: &str) -> Result<Response, ResolveError> {
        self.client
            .head(url)
            .send()
            .await
            .map_err(|source| ResolveError::Http {
                url: url.to_string(),
                source,
            })
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ResolveError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ResolveError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
