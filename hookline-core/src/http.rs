//! HTTP client abstraction used for webhook delivery and the bridge connector.
//!
//! The default implementation wraps reqwest; tests swap in a recording fake
//! or point the real client at a `wiremock` server.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST `body` as JSON. Non-2xx responses are returned, not turned into errors.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: Vec<(String, String)>,
    ) -> Result<HttpResponse, Error>;
}

#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl Default for DefaultHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: Vec<(String, String)>,
    ) -> Result<HttpResponse, Error> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
