//! Search/scrape proxy capability: fetch a URL, get text back, subject to
//! timeout and occasional failure. All network-scraping adapters and the
//! backsearch panel go through this seam so tests can swap in fixtures.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AdapterError;

#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, AdapterError>;
}

/// Production implementation over reqwest with explicit timeouts.
pub struct HttpFetchClient {
    client: reqwest::Client,
}

impl HttpFetchClient {
    pub fn new(request_timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .user_agent("partlens/0.1")
            .build()
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, url: &str) -> Result<String, AdapterError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout(Duration::from_secs(0))
                } else {
                    AdapterError::Network(e.to_string())
                }
            })?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AdapterError::Quota(format!("HTTP 429 from {}", url)));
        }
        if !status.is_success() {
            return Err(AdapterError::Network(format!("HTTP {} from {}", status, url)));
        }
        response
            .text()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }
}

#[cfg(test)]
pub mod testing {
    //! Fixture fetch client shared by adapter and validation tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned pages keyed by URL substring; unknown URLs fail with a
    /// network error, like a proxy that cannot reach the site.
    pub struct FixtureFetch {
        pages: HashMap<String, String>,
        pub calls: AtomicUsize,
        pub delay: Option<Duration>,
    }

    impl FixtureFetch {
        pub fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        pub fn with_page(mut self, url_fragment: &str, body: &str) -> Self {
            self.pages.insert(url_fragment.to_string(), body.to_string());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl FetchClient for FixtureFetch {
        async fn fetch(&self, url: &str) -> Result<String, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.pages
                .iter()
                .find(|(fragment, _)| url.contains(fragment.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| AdapterError::Network(format!("no fixture for {}", url)))
        }
    }
}
