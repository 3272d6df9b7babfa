//! Web search source.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, WebSearchConfig};
use crate::error::ProviderError;

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchHit {
    /// Text returned to the caller for this hit.
    pub fn render(&self) -> String {
        if self.url.is_empty() {
            self.snippet.clone()
        } else {
            format!("{}\n\nSource: {}", self.snippet, self.url)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Searches the web for material related to a problem.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;

    /// Per-call timeout applied by the caller.
    fn timeout(&self) -> Duration;
}

/// JSON search API client: `GET endpoint?q=...&limit=N`.
pub struct HttpWebSearch {
    endpoint: Url,
    api_key: Option<String>,
    max_results: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl fmt::Debug for HttpWebSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpWebSearch")
            .field("endpoint", &self.endpoint.as_str())
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl HttpWebSearch {
    pub fn from_config<F>(config: &WebSearchConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ConfigError::Provider {
            id: "web_search".to_string(),
            reason: format!("invalid endpoint: {e}"),
        })?;
        let api_key = config.api_key_env.as_deref().and_then(|name| lookup(name));
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Provider {
                id: "web_search".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            endpoint,
            api_key,
            max_results: config.max_results.max(1),
            timeout: config.timeout(),
            http,
        })
    }
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let limit = self.max_results.to_string();
        let mut request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("q", query), ("limit", limit.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(parsed
            .results
            .into_iter()
            .filter(|hit| !hit.snippet.trim().is_empty())
            .take(self.max_results as usize)
            .collect())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
