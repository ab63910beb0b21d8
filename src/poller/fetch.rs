// src/poller/fetch.rs
use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;

use crate::error::PollError;

/// One network fetch of one upstream document.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<Value, PollError>;
}

/// `reqwest` client with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("situational-awareness/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building upstream HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Value, PollError> {
        let resp = self
            .client
            .get(endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PollError::Upstream {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        parse_body(&body)
    }
}

/// Empty, `null` and non-JSON bodies are upstream failures.
pub(crate) fn parse_body(body: &str) -> Result<Value, PollError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(PollError::Malformed("empty or null body".into()));
    }
    serde_json::from_str(trimmed).map_err(|e| PollError::Malformed(e.to_string()))
}
