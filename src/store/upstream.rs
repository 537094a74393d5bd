use std::time::Duration;

use log::debug;
use reqwest::header::ACCEPT;

use crate::error::{ResolveError, ResolveResult};
use crate::store::traits::UpstreamFetcher;

/// HTTP client for upstream resources, bounded by a request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl UpstreamFetcher for ReqwestFetcher {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        accept: &str,
    ) -> ResolveResult<String> {
        debug!("GET {} ({} query parameters)", url, query.len());

        let response = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| ResolveError::Upstream(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::Upstream(format!(
                "{} answered {}: {}",
                url, status, body
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ResolveError::Upstream(format!("{}: {}", url, e)))
    }
}
