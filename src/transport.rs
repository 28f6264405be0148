//! Bounded-time network capabilities used by the probe modules
//!
//! Every outbound call carries an explicit timeout and reports failure as a
//! no-value, never an error: a dead endpoint or an unresolvable name is a
//! per-candidate miss, absorbed into partial results by the caller.

use std::net::IpAddr;
use std::time::Duration;

use crate::{ReconError, Result};

/// Response summary for a probed URL
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub content_type: String,
    pub content_length: u64,
    pub body: String,
}

/// Thin reqwest wrapper with a fixed per-request timeout
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ReconError::SetupError(format!("http client init failed: {}", e)))?;

        Ok(Self { client })
    }

    /// GET a URL; any transport or HTTP failure is a miss
    pub async fn get(&self, url: &str) -> Option<PageResponse> {
        let response = self.client.get(url).send().await.ok()?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let content_length = response.content_length().unwrap_or(0);
        let body = response.text().await.unwrap_or_default();

        Some(PageResponse {
            status,
            content_type,
            content_length: if content_length > 0 {
                content_length
            } else {
                body.len() as u64
            },
            body,
        })
    }

    /// GET a URL expecting a 200 JSON body
    pub async fn get_json(&self, url: &str) -> Option<serde_json::Value> {
        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }
}

/// Resolve a host name to its addresses within `timeout`. `None` covers both
/// resolution failure and timeout; the caller decides whether that is a
/// candidate miss or a setup failure.
pub async fn resolve_host(host: &str, timeout: Duration) -> Option<Vec<IpAddr>> {
    let lookup = tokio::net::lookup_host((host, 0u16));
    let addrs = tokio::time::timeout(timeout, lookup).await.ok()?.ok()?;

    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !ips.contains(&addr.ip()) {
            ips.push(addr.ip());
        }
    }

    if ips.is_empty() {
        None
    } else {
        Some(ips)
    }
}
